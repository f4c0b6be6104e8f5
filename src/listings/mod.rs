//! Listing records and drafts.
//!
//! Field names on the wire match the `products` collection layout used
//! by the document store: `university` for campus, `sellerId`,
//! `sellerName`, `createdAt`, `isSold`, and human-readable category
//! labels like `"Dorm Essentials"`.

pub mod firestore;
pub mod memory;
pub mod store;

use serde::{Deserialize, Serialize};

/// Listing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Textbooks,
    #[serde(rename = "Dorm Essentials")]
    DormEssentials,
    Electronics,
    Services,
    /// Catch-all category. `Fashion` is accepted on read as a UI
    /// sub-case of `Other` but never written.
    #[serde(alias = "Fashion")]
    Other,
}

impl Category {
    /// Human-readable label (the wire form).
    pub fn label(&self) -> &'static str {
        match self {
            Category::Textbooks => "Textbooks",
            Category::DormEssentials => "Dorm Essentials",
            Category::Electronics => "Electronics",
            Category::Services => "Services",
            Category::Other => "Other",
        }
    }
}

/// Condition of the item for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Condition {
    New,
    #[serde(rename = "Used - Like New")]
    UsedLikeNew,
    #[default]
    #[serde(rename = "Used - Fair")]
    UsedFair,
}

/// Category predicate for browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Sentinel that matches every category.
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => *wanted == category,
        }
    }
}

/// A stored listing.
///
/// `campus` and `seller_id` are copied from the seller at creation and
/// never updated; `seller_name` is a denormalized snapshot that may
/// drift from the current profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Store-assigned document id.  Not part of the document body.
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub category: Category,
    #[serde(default)]
    pub condition: Condition,
    /// Image URLs, 1-4 entries, insertion order = display order.
    pub images: Vec<String>,
    #[serde(rename = "university")]
    pub campus: String,
    #[serde(rename = "sellerId")]
    pub seller_id: String,
    #[serde(rename = "sellerName", default)]
    pub seller_name: String,
    /// Epoch milliseconds; the sole sort key, newest first.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "isSold", default)]
    pub is_sold: bool,
}

/// A listing about to be inserted (no id yet).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub condition: Condition,
    pub images: Vec<String>,
    #[serde(rename = "university")]
    pub campus: String,
    #[serde(rename = "sellerId")]
    pub seller_id: String,
    #[serde(rename = "sellerName")]
    pub seller_name: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "isSold")]
    pub is_sold: bool,
}

impl NewListing {
    /// Attach the store-assigned id.
    pub fn into_listing(self, id: String) -> Listing {
        Listing {
            id,
            title: self.title,
            description: self.description,
            price: self.price,
            category: self.category,
            condition: self.condition,
            images: self.images,
            campus: self.campus,
            seller_id: self.seller_id,
            seller_name: self.seller_name,
            created_at: self.created_at,
            is_sold: self.is_sold,
        }
    }
}

/// User-entered fields of a listing, before upload and persistence.
///
/// The draft survives a failed post so the user can resubmit without
/// re-entering anything.
#[derive(Debug, Clone, garde::Validate)]
pub struct ListingDraft {
    /// Item name.
    #[garde(length(min = 1, max = 120))]
    pub title: String,

    /// Free-form description, optional.
    #[garde(length(max = 2000))]
    pub description: String,

    /// Asking price; must coerce to a positive number (checked by the
    /// repository, which owns numeric validation).
    #[garde(skip)]
    pub price: f64,

    #[garde(skip)]
    pub category: Category,

    #[garde(skip)]
    pub condition: Condition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[test]
    fn test_category_wire_labels() {
        assert_eq!(
            serde_json::to_value(Category::DormEssentials).unwrap(),
            "Dorm Essentials"
        );
        assert_eq!(serde_json::to_value(Category::Textbooks).unwrap(), "Textbooks");
        let parsed: Category = serde_json::from_value("Dorm Essentials".into()).unwrap();
        assert_eq!(parsed, Category::DormEssentials);
    }

    #[test]
    fn test_fashion_reads_as_other() {
        let parsed: Category = serde_json::from_value("Fashion".into()).unwrap();
        assert_eq!(parsed, Category::Other);
        // Never written back as Fashion.
        assert_eq!(serde_json::to_value(parsed).unwrap(), "Other");
    }

    #[test]
    fn test_condition_wire_labels() {
        assert_eq!(
            serde_json::to_value(Condition::UsedLikeNew).unwrap(),
            "Used - Like New"
        );
        let parsed: Condition = serde_json::from_value("Used - Fair".into()).unwrap();
        assert_eq!(parsed, Condition::UsedFair);
    }

    #[test]
    fn test_category_filter_sentinel() {
        assert!(CategoryFilter::All.matches(Category::Services));
        assert!(CategoryFilter::Only(Category::Textbooks).matches(Category::Textbooks));
        assert!(!CategoryFilter::Only(Category::Textbooks).matches(Category::Other));
    }

    #[test]
    fn test_listing_wire_field_names() {
        let listing = Listing {
            id: "doc-1".to_string(),
            title: "Physics Textbook".to_string(),
            description: String::new(),
            price: 1500.0,
            category: Category::Textbooks,
            condition: Condition::UsedLikeNew,
            images: vec!["https://img.example/a.jpg".to_string()],
            campus: "FUTA".to_string(),
            seller_id: "uid-ada".to_string(),
            seller_name: "Ada".to_string(),
            created_at: 1_700_000_000_000,
            is_sold: false,
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["university"], "FUTA");
        assert_eq!(json["sellerId"], "uid-ada");
        assert_eq!(json["isSold"], false);
        // The id lives in the document name, not the body.
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_draft_validation_bounds() {
        let ok = ListingDraft {
            title: "iPhone 13".to_string(),
            description: "Lightly used".to_string(),
            price: 250_000.0,
            category: Category::Electronics,
            condition: Condition::UsedLikeNew,
        };
        assert!(ok.validate().is_ok());

        let empty_title = ListingDraft {
            title: String::new(),
            ..ok.clone()
        };
        assert!(empty_title.validate().is_err());
    }
}
