pub mod clock;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use status::DeliveryStatus;
pub use types::{
    Message, MessageView, NewMessage, OrderSummary, Profile, Requester, Role, Thread,
    local_part, normalize_identity,
};
