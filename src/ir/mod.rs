//! Canonical in-memory representation of a detection dataset.
//!
//! Every box is stored in pixel-space XYXY inside its image frame. Readers
//! (the validator, the interchange JSON reader) produce these types and the
//! encoders only ever read them.
//!
//! # Example
//!
//! ```
//! use labelforge::ir::{BoundingBox, ImageAnnotation};
//!
//! let annotation = ImageAnnotation::new(
//!     "img_0001",
//!     640,
//!     480,
//!     vec![BoundingBox::from_xyxy(0, 10.0, 20.0, 100.0, 200.0)],
//! );
//! assert!(annotation.has_objects());
//! ```

mod bbox;
mod class_names;
mod coord;
pub mod io_coco_json;
pub mod io_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;
mod space;

pub use bbox::BBoxXYXY;
pub use class_names::{synthesized_name, ClassNames};
pub use coord::Coord;
pub use model::{
    class_ids_of, is_safe_stem, AugmentedRecord, BoundingBox, CanonicalDataset, EncodeContext,
    ImageAnnotation,
};
pub use space::{Normalized, Pixel};
