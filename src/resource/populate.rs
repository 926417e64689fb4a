use serde_json::Value;

use crate::query::{FindQuery, Projection};
use crate::store::{Collection, Document, DocumentStore, StoreError, ID_FIELD};

/// A relation expanded in place on a fetched document.
#[derive(Debug, Clone, Copy)]
pub enum Populate {
    /// `field` holds one id or an array of ids into `collection`; each is
    /// replaced by the referenced document reduced to `select`.
    Ref {
        field: &'static str,
        collection: Collection,
        select: &'static [&'static str],
    },
    /// `field` is filled with every document of `collection` whose
    /// `foreign_field` points back at this one.
    Virtual {
        field: &'static str,
        collection: Collection,
        foreign_field: &'static str,
    },
}

async fn resolve_ref(
    store: &dyn DocumentStore,
    collection: Collection,
    select: &'static [&'static str],
    value: &Value,
) -> Result<Value, StoreError> {
    let Some(id) = value.as_str() else {
        return Ok(value.clone());
    };
    let found = match store.find_by_id(collection, id).await {
        Ok(found) => found,
        Err(StoreError::InvalidId { .. }) => None,
        Err(e) => return Err(e),
    };
    let Some(doc) = found else {
        return Ok(Value::Null);
    };
    let mut shape = FindQuery::new(collection);
    shape.projection = Projection::Include(select.iter().map(|s| s.to_string()).collect());
    Ok(Value::Object(shape.project(doc)))
}

pub(crate) async fn populate(
    store: &dyn DocumentStore,
    relations: &[Populate],
    doc: &mut Document,
) -> Result<(), StoreError> {
    for relation in relations {
        match *relation {
            Populate::Ref {
                field,
                collection,
                select,
            } => {
                let expanded = match doc.get(field) {
                    Some(Value::Array(ids)) => {
                        let mut out = Vec::with_capacity(ids.len());
                        for id in ids {
                            let v = resolve_ref(store, collection, select, id).await?;
                            if !v.is_null() {
                                out.push(v);
                            }
                        }
                        Value::Array(out)
                    }
                    Some(v) => resolve_ref(store, collection, select, v).await?,
                    None => continue,
                };
                doc.insert(field.to_string(), expanded);
            }
            Populate::Virtual {
                field,
                collection,
                foreign_field,
            } => {
                let Some(id) = doc.get(ID_FIELD).cloned() else {
                    continue;
                };
                let related = store
                    .find(&FindQuery::new(collection).where_eq(foreign_field, id))
                    .await?;
                doc.insert(
                    field.to_string(),
                    Value::Array(related.into_iter().map(Value::Object).collect()),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn refs_and_virtuals_expand() {
        let store = MemoryStore::new();
        let guide = store
            .create(
                Collection::Users,
                doc(json!({ "name": "Lea", "email": "lea@example.com", "password": "h" })),
            )
            .await
            .unwrap();
        let guide_id = guide["id"].clone();
        let tour = store
            .create(
                Collection::Tours,
                doc(json!({
                    "name": "The Forest Hiker",
                    "duration": 5,
                    "maxGroupSize": 10,
                    "difficulty": "easy",
                    "price": 397,
                    "summary": "Breathtaking hike",
                    "imageCover": "cover.jpg",
                    "guides": [guide_id]
                })),
            )
            .await
            .unwrap();
        store
            .create(
                Collection::Reviews,
                doc(json!({
                    "review": "Lovely",
                    "rating": 5,
                    "tour": tour["id"],
                    "user": guide["id"]
                })),
            )
            .await
            .unwrap();

        let mut expanded = tour.clone();
        let relations = [
            Populate::Ref {
                field: "guides",
                collection: Collection::Users,
                select: &["name"],
            },
            Populate::Virtual {
                field: "reviews",
                collection: Collection::Reviews,
                foreign_field: "tour",
            },
        ];
        populate(&store, &relations, &mut expanded).await.unwrap();

        let guides = expanded["guides"].as_array().unwrap();
        assert_eq!(guides[0]["name"], json!("Lea"));
        assert!(guides[0].get("email").is_none());
        assert!(guides[0].get("password").is_none());
        assert_eq!(expanded["reviews"].as_array().unwrap().len(), 1);
    }
}
