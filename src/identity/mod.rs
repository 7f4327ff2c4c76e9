//! Identity resolution: references, handles, and the shared handle table

mod handle;
mod public_id;
mod resolver;

pub use handle::{Handle, HandleState, IdentityDelta, IdentityRecord};
pub use public_id::{PublicId, CHRONICLE_NAMESPACE};
pub use resolver::{IdentityError, IdentityResolver, ResolutionScope};
