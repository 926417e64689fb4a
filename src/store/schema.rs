//! Declarative field constraints for each collection.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// Reference to another document's `id`.
    Id,
    /// RFC 3339 timestamp stored as a string.
    Date,
    Array,
    Object,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    /// Stripped from read responses unless explicitly requested by the server.
    pub hidden: bool,
    /// Settable only through the dedicated credential routes.
    pub credential: bool,
    pub trim: bool,
    pub lowercase: bool,
    pub email: bool,
    pub one_of: &'static [&'static str],
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub default: Option<Value>,
}

impl Field {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            unique: false,
            hidden: false,
            credential: false,
            trim: false,
            lowercase: false,
            email: false,
            one_of: &[],
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            default: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }
    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldKind::Number)
    }
    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }
    pub fn id(name: &'static str) -> Self {
        Self::new(name, FieldKind::Id)
    }
    pub fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }
    pub fn array(name: &'static str) -> Self {
        Self::new(name, FieldKind::Array)
    }
    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
    pub fn credential(mut self) -> Self {
        self.credential = true;
        self.hidden = true;
        self
    }
    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }
    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }
    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }
    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = values;
        self
    }
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn normalize(&self, v: &mut Value) {
        if let Value::String(s) = v {
            if self.trim {
                *s = s.trim().to_string();
            }
            if self.lowercase {
                *s = s.to_lowercase();
            }
        }
    }

    fn check(&self, v: &Value, errors: &mut Vec<String>) {
        let name = self.name;
        let type_ok = match self.kind {
            FieldKind::String => v.is_string(),
            FieldKind::Number => v.is_number(),
            FieldKind::Boolean => v.is_boolean(),
            FieldKind::Id => v
                .as_str()
                .map(|s| uuid::Uuid::parse_str(s).is_ok())
                .unwrap_or(false),
            FieldKind::Date => v
                .as_str()
                .map(|s| {
                    time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
                        .is_ok()
                })
                .unwrap_or(false),
            FieldKind::Array => v.is_array(),
            FieldKind::Object => v.is_object(),
        };
        if !type_ok {
            errors.push(format!("{name} has an invalid value"));
            return;
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(min) = self.min_len {
                if len < min {
                    errors.push(format!("{name} must have at least {min} characters"));
                }
            }
            if let Some(max) = self.max_len {
                if len > max {
                    errors.push(format!("{name} must have at most {max} characters"));
                }
            }
            if self.email && !is_valid_email(s) {
                errors.push(format!("{name} must be a valid email"));
            }
            if !self.one_of.is_empty() && !self.one_of.contains(&s) {
                errors.push(format!("{name} must be one of: {}", self.one_of.join(", ")));
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    errors.push(format!("{name} must be at least {min}"));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    errors.push(format!("{name} must be at most {max}"));
                }
            }
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Lowercase, ASCII-dash separated form of `name`.
pub fn slugify(name: &str) -> String {
    lazy_static! {
        static ref NON_WORD: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    let lowered = name.to_lowercase();
    NON_WORD
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

pub struct Schema {
    pub fields: Vec<Field>,
    /// Runs on every create and update, before validation.
    pub hook: Option<fn(&mut Document)>,
    /// Derived read-only fields, computed on every projected read.
    pub virtuals: Option<fn(&mut Document)>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn hidden_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.hidden).map(|f| f.name)
    }

    pub fn credential_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.credential).map(|f| f.name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.unique).map(|f| f.name)
    }

    pub fn apply_defaults(&self, doc: &mut Document) {
        for f in &self.fields {
            if let Some(default) = &f.default {
                if doc.get(f.name).map_or(true, Value::is_null) {
                    doc.insert(f.name.to_string(), default.clone());
                }
            }
        }
    }

    /// Normalizes declared fields in place, then collects every constraint
    /// violation. Undeclared fields are left untouched.
    pub fn validate(&self, doc: &mut Document) -> Result<(), Vec<String>> {
        if let Some(hook) = self.hook {
            hook(doc);
        }
        let mut errors = Vec::new();
        for f in &self.fields {
            match doc.get_mut(f.name) {
                Some(v) if !v.is_null() => {
                    f.normalize(v);
                    f.check(v, &mut errors);
                }
                _ if f.required => errors.push(format!("{} is required", f.name)),
                _ => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn tour_hook(doc: &mut Document) {
    if let Some(name) = doc.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        doc.insert("slug".into(), Value::String(slug));
    }
    // One decimal place, half rounding up.
    let rounded = doc
        .get("ratingsAverage")
        .and_then(Value::as_f64)
        .and_then(|r| serde_json::Number::from_f64((r * 10.0).round() / 10.0));
    if let Some(r) = rounded {
        doc.insert("ratingsAverage".into(), Value::Number(r));
    }
}

fn tour_virtuals(doc: &mut Document) {
    let weeks = doc
        .get("duration")
        .and_then(Value::as_f64)
        .and_then(|d| serde_json::Number::from_f64(d / 7.0));
    if let Some(w) = weeks {
        doc.insert("durationWeeks".into(), Value::Number(w));
    }
}

lazy_static! {
    pub static ref TOURS: Schema = Schema {
        fields: vec![
            Field::string("name").required().unique().trim().length(10, 40),
            Field::string("slug"),
            Field::number("duration").required(),
            Field::number("maxGroupSize").required(),
            Field::string("difficulty")
                .required()
                .one_of(&["easy", "medium", "difficult"]),
            Field::number("ratingsAverage").range(1.0, 5.0).default(Value::from(4.5)),
            Field::number("ratingsQuantity").default(Value::from(0)),
            Field::number("price").required(),
            Field::number("priceDiscount"),
            Field::string("summary").required().trim(),
            Field::string("description").trim(),
            Field::string("imageCover").required(),
            Field::array("images"),
            Field::array("startDates"),
            Field::array("guides"),
            Field::object("startLocation"),
            Field::array("locations"),
        ],
        hook: Some(tour_hook),
        virtuals: Some(tour_virtuals),
    };

    pub static ref USERS: Schema = Schema {
        fields: vec![
            Field::string("name").required().trim(),
            Field::string("email").required().unique().trim().lowercase().email(),
            Field::string("photo").default(Value::from("default.jpg")),
            Field::string("role")
                .one_of(&["user", "guide", "lead-guide", "admin"])
                .default(Value::from("user")),
            Field::string("password").required().credential(),
            Field::date("passwordChangedAt").credential(),
            Field::string("passwordResetToken").credential(),
            Field::date("passwordResetExpires").credential(),
            Field::boolean("active").hidden().default(Value::Bool(true)),
        ],
        hook: None,
        virtuals: None,
    };

    pub static ref REVIEWS: Schema = Schema {
        fields: vec![
            Field::string("review").required().trim(),
            Field::number("rating").required().range(1.0, 5.0),
            Field::id("tour").required(),
            Field::id("user").required(),
        ],
        hook: None,
        virtuals: None,
    };

    pub static ref BOOKINGS: Schema = Schema {
        fields: vec![
            Field::id("tour").required(),
            Field::id("user").required(),
            Field::number("price").required().range(0.0, f64::MAX),
            Field::boolean("paid").default(Value::Bool(true)),
        ],
        hook: None,
        virtuals: None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn reports_every_violation() {
        let mut d = doc(json!({ "name": "short", "difficulty": "extreme", "price": "free" }));
        let errors = TOURS.validate(&mut d).unwrap_err();
        assert!(errors.iter().any(|e| e == "name must have at least 10 characters"));
        assert!(errors.iter().any(|e| e.starts_with("difficulty must be one of")));
        assert!(errors.iter().any(|e| e == "price has an invalid value"));
        assert!(errors.iter().any(|e| e == "duration is required"));
    }

    #[test]
    fn hook_and_normalization_run_before_checks() {
        let mut d = doc(json!({
            "name": "  The Forest Hiker  ",
            "duration": 5,
            "maxGroupSize": 10,
            "difficulty": "easy",
            "price": 397,
            "summary": "Breathtaking hike",
            "imageCover": "cover.jpg"
        }));
        TOURS.apply_defaults(&mut d);
        TOURS.validate(&mut d).expect("valid tour");
        assert_eq!(d["name"], json!("The Forest Hiker"));
        assert_eq!(d["slug"], json!("the-forest-hiker"));
        assert_eq!(d["ratingsAverage"], json!(4.5));
    }

    #[test]
    fn ratings_round_to_one_decimal() {
        let mut d = doc(json!({ "name": "The Star Gazer", "ratingsAverage": 4.666_666 }));
        tour_hook(&mut d);
        assert_eq!(d["ratingsAverage"], json!(4.7));

        let mut d = doc(json!({ "ratingsAverage": 4.25 }));
        tour_hook(&mut d);
        assert_eq!(d["ratingsAverage"], json!(4.3));
    }

    #[test]
    fn duration_weeks_follow_duration() {
        let mut d = doc(json!({ "duration": 14 }));
        tour_virtuals(&mut d);
        assert_eq!(d["durationWeeks"], json!(2.0));

        let mut d = doc(json!({ "name": "no duration" }));
        tour_virtuals(&mut d);
        assert!(d.get("durationWeeks").is_none());
    }

    #[test]
    fn emails_are_lowercased_and_checked() {
        let mut d = doc(json!({ "name": "Ada", "email": " ADA@Example.COM ", "password": "x" }));
        USERS.validate(&mut d).expect("valid user");
        assert_eq!(d["email"], json!("ada@example.com"));

        let mut bad = doc(json!({ "name": "Ada", "email": "nope", "password": "x" }));
        assert!(USERS.validate(&mut bad).is_err());
    }

    #[test]
    fn credential_fields_are_hidden() {
        let hidden: Vec<_> = USERS.hidden_fields().collect();
        assert!(hidden.contains(&"password"));
        assert!(hidden.contains(&"passwordResetToken"));
        assert!(hidden.contains(&"active"));
        assert!(!hidden.contains(&"email"));
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("The Sea Explorer!"), "the-sea-explorer");
        assert_eq!(slugify("--Snow & Ice--"), "snow-ice");
    }
}
