//! Resource types served through the generic handlers in [`handlers`].

pub mod handlers;
mod populate;

pub use populate::Populate;

use crate::store::Collection;

/// A collection exposed over the generic list/get/create/update/delete
/// handlers.
pub trait Resource: Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Route parameter naming a parent document and the field it narrows or
    /// fills, e.g. reviews nested under `/tours/:tour_id`.
    const PARENT: Option<(&'static str, &'static str)> = None;

    /// Field filled with the caller's id on create when the body omits it.
    const OWNER_FIELD: Option<&'static str> = None;

    /// Relations expanded by `get_one`.
    const POPULATE: &'static [Populate] = &[];
}

pub struct Tours;
pub struct Users;
pub struct Reviews;
pub struct Bookings;

impl Resource for Tours {
    const COLLECTION: Collection = Collection::Tours;
    const POPULATE: &'static [Populate] = &[
        Populate::Ref {
            field: "guides",
            collection: Collection::Users,
            select: &["name", "email", "photo", "role"],
        },
        Populate::Virtual {
            field: "reviews",
            collection: Collection::Reviews,
            foreign_field: "tour",
        },
    ];
}

impl Resource for Users {
    const COLLECTION: Collection = Collection::Users;
}

impl Resource for Reviews {
    const COLLECTION: Collection = Collection::Reviews;
    const PARENT: Option<(&'static str, &'static str)> = Some(("tour_id", "tour"));
    const OWNER_FIELD: Option<&'static str> = Some("user");
    const POPULATE: &'static [Populate] = &[
        Populate::Ref {
            field: "user",
            collection: Collection::Users,
            select: &["name", "photo"],
        },
        Populate::Ref {
            field: "tour",
            collection: Collection::Tours,
            select: &["name"],
        },
    ];
}

impl Resource for Bookings {
    const COLLECTION: Collection = Collection::Bookings;
    const POPULATE: &'static [Populate] = &[
        Populate::Ref {
            field: "user",
            collection: Collection::Users,
            select: &["name", "email"],
        },
        Populate::Ref {
            field: "tour",
            collection: Collection::Tours,
            select: &["name"],
        },
    ];
}
