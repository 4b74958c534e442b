/// Storage key layout
///
/// Every image object lives under a deterministic key:
///
/// ```text
/// agencies/{agency_id}/properties/{listing_type}/{property_id}/{image_id}/{variant}.jpg
/// ```
///
/// The hierarchy makes prefix operations cheap: delete a property's images,
/// delete an agency's whole footprint, or sum usage per listing type, all
/// without a database lookup.

use uuid::Uuid;

use crate::models::property::ListingType;

/// Key for one image variant
pub fn image_key(
    agency_id: Uuid,
    listing_type: ListingType,
    property_id: Uuid,
    image_id: Uuid,
    variant: &str,
) -> String {
    format!(
        "agencies/{}/properties/{}/{}/{}/{}.jpg",
        agency_id,
        listing_type.as_str(),
        property_id,
        image_id,
        variant
    )
}

/// Prefix covering all variants of one image
pub fn image_prefix(
    agency_id: Uuid,
    listing_type: ListingType,
    property_id: Uuid,
    image_id: Uuid,
) -> String {
    format!(
        "agencies/{}/properties/{}/{}/{}/",
        agency_id,
        listing_type.as_str(),
        property_id,
        image_id
    )
}

/// Prefix covering all images of one property
pub fn property_prefix(agency_id: Uuid, listing_type: ListingType, property_id: Uuid) -> String {
    format!(
        "agencies/{}/properties/{}/{}/",
        agency_id,
        listing_type.as_str(),
        property_id
    )
}

/// Prefix covering all properties of one listing type under an agency
pub fn listing_prefix(agency_id: Uuid, listing_type: ListingType) -> String {
    format!("agencies/{}/properties/{}/", agency_id, listing_type.as_str())
}

/// Prefix covering an agency's entire storage footprint
pub fn agency_prefix(agency_id: Uuid) -> String {
    format!("agencies/{}/", agency_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let agency_id = Uuid::new_v4();
        let property_id = Uuid::new_v4();
        let image_id = Uuid::new_v4();

        let key = image_key(
            agency_id,
            ListingType::Sale,
            property_id,
            image_id,
            "medium",
        );

        assert_eq!(
            key,
            format!(
                "agencies/{}/properties/sale/{}/{}/medium.jpg",
                agency_id, property_id, image_id
            )
        );
    }

    #[test]
    fn test_prefixes_nest() {
        let agency_id = Uuid::new_v4();
        let property_id = Uuid::new_v4();
        let image_id = Uuid::new_v4();

        let key = image_key(
            agency_id,
            ListingType::Rent,
            property_id,
            image_id,
            "original",
        );

        assert!(key.starts_with(&image_prefix(
            agency_id,
            ListingType::Rent,
            property_id,
            image_id
        )));
        assert!(key.starts_with(&property_prefix(agency_id, ListingType::Rent, property_id)));
        assert!(key.starts_with(&listing_prefix(agency_id, ListingType::Rent)));
        assert!(key.starts_with(&agency_prefix(agency_id)));

        // A sale key never matches the rent prefix
        let sale_key = image_key(
            agency_id,
            ListingType::Sale,
            property_id,
            image_id,
            "original",
        );
        assert!(!sale_key.starts_with(&listing_prefix(agency_id, ListingType::Rent)));
    }
}
