//! Well-known class and property URIs.

/// Root class every compiled delivery lives under.
pub const DELIVERY_ASSEMBLY_CLASS: &str =
    "http://www.tao.lu/Ontologies/TAODelivery.rdf#AssembledDelivery";

/// Delivery property pointing back at the test it was compiled from.
pub const DELIVERY_ORIGIN_PROPERTY: &str =
    "http://www.tao.lu/Ontologies/TAODelivery.rdf#AssembledDeliveryOrigin";

/// Test property listing the URIs of its items.
pub const TEST_ITEMS_PROPERTY: &str = "http://www.tao.lu/Ontologies/TAOTest.rdf#TestItems";
