//! Reader, composer and serializer for Pixar's Universal Scene Description.
//!
//! Three encodings of the same data model are ingested — USDA text, the
//! binary USDC crate form, and USDZ zip containers — into a [`layer::Layer`]
//! of authored prim specs. The [`composition`] engine flattens composition
//! arcs (subLayers, references, payload, inherits, variantSets, specializes)
//! against an asset resolver, and [`reconstruct`] lowers the result to a
//! typed [`stage::Stage`]. The text form can be re-emitted via [`pprint`].

pub mod api;
pub mod ascii;
pub mod composition;
pub mod crate_reader;
pub mod error;
pub mod json;
pub mod layer;
pub mod path;
pub mod pprint;
pub mod reconstruct;
pub mod resolver;
pub mod stage;
pub mod stream;
pub mod strutil;
pub mod usdz;
pub mod value;

pub use api::{
    LoadOptions, UsdFormat, detect_format, is_usd, is_usda, is_usdc, is_usdz,
    load_layer_from_file, load_layer_from_memory, load_usd_from_file, load_usd_from_memory,
    load_usda_from_memory, load_usdc_from_memory, load_usdz_from_memory,
};
pub use composition::{
    CompositionFeatures, composite, composite_inherits, composite_payload,
    composite_references, composite_specializes, composite_sublayers, composite_variant,
};
pub use error::{Result, UsdError, Warning, Warnings};
pub use layer::Layer;
pub use resolver::AssetResolver;
pub use stage::Stage;
