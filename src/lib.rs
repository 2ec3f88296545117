#![doc = "Polymesh public API"]
pub mod comm;
pub mod config;
pub mod context;
pub mod error;
pub mod geom;
pub mod io;
pub mod logging;
pub mod mesh;
pub mod source;
pub mod weights;

#[doc(inline)]
pub use context::Context;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use mesh::{convert, FlatMeshArrays, GlobalMesh};

#[doc(inline)]
pub use weights::{apply_weights, merge_weights, ApplyPaths, ConservationWarning};
