use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success,
    Danger,
    Warning,
    Info,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Success => "success",
            Category::Danger => "danger",
            Category::Warning => "warning",
            Category::Info => "info",
        }
    }
}

/// One-shot status message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub category: Category,
    pub message: String,
}

impl Flash {
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        Flash {
            category,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Flash::new(Category::Success, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Flash::new(Category::Danger, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Flash::new(Category::Info, message)
    }
}
