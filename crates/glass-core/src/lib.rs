pub mod frame;
pub mod list_model;
pub mod model;

pub use list_model::{FocusChange, ListModel};
pub use model::{
    ChannelKind, EventCategory, EventData, InventoryData, JobData, JobEntry, JobRecord,
    KeyCategory, ModelError, SourceFailure,
};
