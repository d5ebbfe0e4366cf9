pub mod device;
pub mod loaders;
pub mod phone;
pub mod result;
pub mod ui_map;

pub use device::{Device, DeviceId, SessionState};
pub use loaders::load_ui_map;
pub use phone::PhoneNumber;
pub use result::{FailureKind, RegistrationResult, RegistrationStatus, VerificationOutcome};
pub use ui_map::{Locator, LocatorStrategy, UiMap};
