//! Variant resolution: map a cart line's attribute selection to exactly one
//! stock source.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::cart::{AttributeSelection, CartLine};
use crate::domain::order::{ResolvedLine, StockSourceId};
use crate::domain::product::{AttributeCatalog, Product, Variant};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The selection matches no declared variant of the product.
    #[error("no variant of {product_name} matches the selected attributes")]
    NoMatchingVariant {
        product_id: Uuid,
        product_name: String,
    },
    /// More than one variant carries an identical option set. A catalog
    /// integrity fault, not something a retry can fix.
    #[error("selection is ambiguous for {product_name}: {matches} variants match")]
    AmbiguousVariant {
        product_id: Uuid,
        product_name: String,
        matches: usize,
    },
}

/// Resolve one merged cart line against its product.
///
/// A variant-less product is its own stock source. Otherwise a variant
/// matches iff its option count equals the selection size (so a partial
/// subset cannot match) and every catalog-resolved (name, value) option
/// pair is present in the selection. Pure lookup; no side effects.
pub fn resolve_line<C: AttributeCatalog>(
    product: &Product,
    line: &CartLine,
    catalog: &C,
) -> Result<ResolvedLine, ResolveError> {
    if !product.has_variants() {
        return Ok(snapshot(product, None, line));
    }

    let matches: Vec<&Variant> = product
        .variants
        .iter()
        .filter(|v| variant_matches(v, &line.selection, catalog))
        .collect();

    match matches.as_slice() {
        [variant] => Ok(snapshot(product, Some(variant), line)),
        [] => Err(ResolveError::NoMatchingVariant {
            product_id: product.id,
            product_name: product.name.clone(),
        }),
        many => Err(ResolveError::AmbiguousVariant {
            product_id: product.id,
            product_name: product.name.clone(),
            matches: many.len(),
        }),
    }
}

fn variant_matches<C: AttributeCatalog>(
    variant: &Variant,
    selection: &AttributeSelection,
    catalog: &C,
) -> bool {
    if variant.options.len() != selection.len() {
        return false;
    }
    variant.options.iter().all(|opt| {
        catalog
            .attribute_name(opt.attribute_id)
            .is_some_and(|name| selection.contains(name, opt.value.trim()))
    })
}

fn snapshot(product: &Product, variant: Option<&Variant>, line: &CartLine) -> ResolvedLine {
    ResolvedLine {
        source: StockSourceId {
            product_id: product.id,
            variant_id: variant.map(|v| v.id),
        },
        quantity: line.quantity,
        unit_price: variant.and_then(|v| v.price).unwrap_or(product.price),
        name: product.name.clone(),
        image: variant
            .and_then(|v| v.image.clone())
            .or_else(|| product.image.clone()),
        category: product.category.clone(),
        selection: line.selection.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::SelectedAttribute;
    use crate::domain::product::VariantOption;
    use chrono::Utc;
    use std::collections::HashMap;

    struct Fixture {
        product: Product,
        catalog: HashMap<Uuid, String>,
        size: Uuid,
    }

    fn fixture() -> Fixture {
        let color = Uuid::new_v4();
        let size = Uuid::new_v4();
        let mut catalog = HashMap::new();
        catalog.insert(color, "Color".to_string());
        catalog.insert(size, "Size".to_string());

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Shirt".into(),
            price: 1500,
            image: Some("shirt.jpg".into()),
            category: Some("apparel".into()),
            base_stock: 0,
            stock: 5,
            sales_count: 0,
            variants: vec![
                Variant {
                    id: Uuid::new_v4(),
                    options: vec![VariantOption {
                        attribute_id: color,
                        value: "Red".into(),
                    }],
                    stock: 5,
                    price: Some(1700),
                    image: Some("shirt-red.jpg".into()),
                    sales_count: 0,
                },
                Variant {
                    id: Uuid::new_v4(),
                    options: vec![VariantOption {
                        attribute_id: color,
                        value: "Blue".into(),
                    }],
                    stock: 0,
                    price: None,
                    image: None,
                    sales_count: 0,
                },
            ],
            created_at: now,
            updated_at: now,
        };
        Fixture {
            product,
            catalog,
            size,
        }
    }

    fn line_for(product_id: Uuid, pairs: Vec<(&str, &str)>) -> CartLine {
        CartLine {
            product_id,
            quantity: 1,
            selection: AttributeSelection::new(
                pairs
                    .into_iter()
                    .map(|(n, v)| SelectedAttribute {
                        name: n.into(),
                        value: v.into(),
                    })
                    .collect(),
            ),
            display_price: None,
            display_name: None,
            display_image: None,
        }
    }

    #[test]
    fn test_variantless_product_is_its_own_source() {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Mug".into(),
            price: 900,
            image: None,
            category: None,
            base_stock: 12,
            stock: 12,
            sales_count: 0,
            variants: vec![],
            created_at: now,
            updated_at: now,
        };
        let resolved = resolve_line(
            &product,
            &line_for(product.id, vec![("Color", "Red")]),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(resolved.source.variant_id, None);
        assert_eq!(resolved.unit_price, 900);
    }

    #[test]
    fn test_exact_match_picks_single_variant() {
        let f = fixture();
        let resolved = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("Color", "Red")]),
            &f.catalog,
        )
        .unwrap();
        assert_eq!(resolved.source.variant_id, Some(f.product.variants[0].id));
        // Variant overrides win in the snapshot.
        assert_eq!(resolved.unit_price, 1700);
        assert_eq!(resolved.image.as_deref(), Some("shirt-red.jpg"));
    }

    #[test]
    fn test_option_count_prevents_subset_match() {
        let mut f = fixture();
        // Red variant grows a second option; a {Color: Red}-only selection
        // must no longer match it.
        f.product.variants[0].options.push(VariantOption {
            attribute_id: f.size,
            value: "M".into(),
        });
        let err = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("Color", "Red")]),
            &f.catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingVariant { .. }));
    }

    #[test]
    fn test_unknown_value_is_no_matching_variant() {
        let f = fixture();
        let err = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("Color", "Green")]),
            &f.catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingVariant { .. }));
    }

    #[test]
    fn test_duplicate_option_sets_are_ambiguous() {
        let mut f = fixture();
        let clone = Variant {
            id: Uuid::new_v4(),
            ..f.product.variants[0].clone()
        };
        f.product.variants.push(clone);
        let err = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("Color", "Red")]),
            &f.catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousVariant { matches: 2, .. }));
    }

    #[test]
    fn test_value_comparison_is_case_sensitive() {
        let f = fixture();
        let err = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("Color", "red")]),
            &f.catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingVariant { .. }));
    }

    #[test]
    fn test_name_matching_is_identifier_driven() {
        let f = fixture();
        // Selection uses a differently-cased name; the catalog-resolved
        // name still matches it.
        let resolved = resolve_line(
            &f.product,
            &line_for(f.product.id, vec![("  color ", "Blue")]),
            &f.catalog,
        )
        .unwrap();
        assert_eq!(resolved.source.variant_id, Some(f.product.variants[1].id));
    }
}
