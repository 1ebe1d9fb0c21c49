//! String identifiers shared with the remote API
//!
//! Server ids are opaque strings. Instances created client-side before the
//! server has answered carry a `local-` prefixed UUID v4 until reconciled.

const LOCAL_PREFIX: &str = "local-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh client-side id for a pending instance
            pub fn local() -> Self {
                Self(format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4()))
            }

            /// Whether the server has not assigned this id yet
            pub fn is_local(&self) -> bool {
                self.0.starts_with(LOCAL_PREFIX)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a span or document-type annotation
    AnnotationId
);
string_id!(
    /// Identifier of a relation group
    RelationId
);
string_id!(
    /// Identifier of an annotation label
    LabelId
);
