pub mod device_ctx;
pub mod probes;
pub mod registration_flow;

pub use device_ctx::DeviceCtx;
pub use probes::{run_probes, verification_probes, Probe, ProbeReport};
pub use registration_flow::{FlowState, RegistrationFlow};
