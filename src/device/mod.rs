//! Bus-hosted peripheral controllers.
//!
//! Controller register semantics are out of scope for this core; the types
//! here carry identity, reset behavior, and the few pieces the machine
//! itself touches (the Aeolia scratchpad wiring and the UART backends).
//! The controller roster is fixed per machine variant: buses are typed
//! structs built once at construction, not runtime-extensible registries.

pub mod aeolia;
pub mod liverpool;

pub use aeolia::{AeoliaHub, AeoliaHubConfig};
pub use liverpool::LiverpoolHost;

/// Trait for bus-hosted controllers.
pub trait Device {
    /// Controller name, stable across resets.
    fn name(&self) -> &'static str;

    /// Return the controller to its power-on state.
    fn reset(&mut self);
}

/// Define a controller whose register model is out of scope: identity and
/// reset behavior only.
macro_rules! stub_controller {
    ($(#[$doc:meta])* $ty:ident, $name:literal) => {
        $(#[$doc])*
        pub struct $ty {
            enabled: bool,
        }

        impl $ty {
            pub fn new() -> Self {
                Self { enabled: true }
            }

            pub fn enabled(&self) -> bool {
                self.enabled
            }
        }

        impl crate::device::Device for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn reset(&mut self) {
                self.enabled = true;
            }
        }
    };
}

pub(crate) use stub_controller;
