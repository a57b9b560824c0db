//! Static keyword taxonomy for naming-based categorization.
//!
//! A method name belongs to the first category in declaration order whose
//! keyword appears as a name prefix or as a `_`-separated token. Names
//! matching nothing are uncategorized and land in the "core" cluster.

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingCategory {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

pub static NAMING_TAXONOMY: Lazy<Vec<NamingCategory>> = Lazy::new(|| {
    vec![
        NamingCategory {
            name: "validation",
            keywords: &["validate", "check", "verify", "ensure"],
        },
        NamingCategory {
            name: "processing",
            keywords: &["process", "handle", "execute", "run"],
        },
        NamingCategory {
            name: "data_access",
            keywords: &["get", "fetch", "load", "read"],
        },
        NamingCategory {
            name: "data_mutation",
            keywords: &["set", "save", "store", "write", "update"],
        },
        NamingCategory {
            name: "transformation",
            keywords: &["convert", "transform", "parse", "format"],
        },
        NamingCategory {
            name: "calculation",
            keywords: &["calculate", "compute", "aggregate", "sum"],
        },
        NamingCategory {
            name: "lifecycle",
            keywords: &["init", "setup", "initialize", "configure"],
        },
        NamingCategory {
            name: "utilities",
            keywords: &["util", "helper", "common", "shared"],
        },
    ]
});

/// Category a method name falls into, or `None` for uncategorized ("core").
pub fn categorize(method_name: &str) -> Option<&'static str> {
    let lower = method_name.to_lowercase();
    for category in NAMING_TAXONOMY.iter() {
        if category
            .keywords
            .iter()
            .any(|&kw| lower.starts_with(kw) || lower.contains(&format!("_{}", kw)))
        {
            return Some(category.name);
        }
    }
    None
}
