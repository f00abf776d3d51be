//! Rule table for product-detail items of the JSON catalog API.

use shelf_core::error::ExtractionError;
use shelf_core::extract::{Coerce, ExtractionRule, Fold, Segment};
use shelf_core::transform::JsonTransformer;

/// Category ids that are navigation roots rather than real categories.
pub const EXCLUDED_CATEGORY_IDS: [&str; 3] = ["2669", "2672", "2671"];

pub const NAME: &str = "product_api";

fn path(dotted: &str) -> Vec<Segment> {
    Segment::parse_path(dotted)
}

fn attribute_fold() -> Fold {
    Fold::LabeledValues {
        label_key: "attribute_label".to_string(),
        values_key: "values".to_string(),
        value_key: "value".to_string(),
    }
}

/// The transformer for API product items.
pub fn product_api_transformer() -> Result<JsonTransformer, ExtractionError> {
    let mut rules: Vec<ExtractionRule> = ["id", "name", "sku", "mnn_ru", "promo_label"]
        .into_iter()
        .map(ExtractionRule::direct)
        .collect();

    for (output, source) in [
        ("is_active", "active"),
        ("is_receipt", "rec_need"),
        ("is_delivery", "delivery"),
        ("is_in_stock", "is_in_stock"),
        ("is_thermolabile", "thermolabile"),
    ] {
        rules.push(ExtractionRule::boolean(output, source));
    }

    rules.extend([
        ExtractionRule::nested("manufacturer_id", path("manufacturer_id.option_id")),
        ExtractionRule::nested("manufacturer", path("manufacturer_id.label")),
        ExtractionRule::nested("manufacturer_ru", path("manufacturer_ru.label")),
        ExtractionRule::nested_with(
            "price",
            path("price.regularPrice.amount.value"),
            Coerce::ToFloat,
        ),
        ExtractionRule::nested("images", path("media_gallery.0")),
        ExtractionRule::nested("original", path("orig_preparat.label")),
        ExtractionRule::nested_with(
            "forms_url",
            path("lekforms_url"),
            Coerce::SplitPart {
                separator: "||".to_string(),
                index: 1,
            },
        ),
        ExtractionRule::fold(
            "categories",
            "breadcrumbs",
            Fold::BreadcrumbIndex {
                list_key: "path".to_string(),
                id_key: "id".to_string(),
                label_key: "name".to_string(),
                exclude: EXCLUDED_CATEGORY_IDS.iter().map(|s| s.to_string()).collect(),
            },
        ),
        ExtractionRule::nested_with(
            "spec_attributes",
            path("specification_set_attributes"),
            Coerce::Fold(attribute_fold()),
        ),
        ExtractionRule::nested_with(
            "desc_attributes",
            path("description_set_attributes"),
            Coerce::Fold(attribute_fold()),
        ),
    ]);

    JsonTransformer::new(NAME, rules)
}
