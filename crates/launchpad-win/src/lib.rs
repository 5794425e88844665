//! Windows plumbing for the launchpad bootloader
//!
//! - **actctx**: pins the process default activation context and scopes
//!   in-memory native loads inside it
//! - **legacy**: stand-ins for kernel32 exports missing before Vista
//!
//! Decision logic is portable and tested everywhere; the kernel32 backends
//! only build on Windows.

pub mod actctx;
pub mod legacy;
#[cfg(windows)]
mod sys;

pub use actctx::{
    ActCtxBackend, ActCtxSupport, ActivationContext, ActivationCookie, ActivationScope,
    ContextHandle,
};
pub use legacy::{device_path_to_dos, DosDevice, TickAccumulator};

#[cfg(windows)]
pub use actctx::Kernel32ActCtx;
#[cfg(windows)]
pub use legacy::{get_final_path_name_by_handle_w, get_tick_count64};
