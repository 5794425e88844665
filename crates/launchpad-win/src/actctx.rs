//! Activation context scoping for in-memory native loads
//!
//! Extension images are normally built without a manifest, so they have to be
//! mapped while the process default activation context is active:
//! 1. On startup the current context is captured and pinned (add-ref)
//! 2. Every native load runs between a paired activate/deactivate
//! 3. The pinned context is released exactly once at teardown
//!
//! Systems without the activation-context API get a context object whose
//! operations are all no-ops.

use std::ffi::c_void;
use std::ptr::NonNull;

use tracing::{debug, warn};

/// Opaque activation context handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextHandle(NonNull<c_void>);

impl ContextHandle {
    /// Wrap a raw handle. The null handle (the system default context) is `None`.
    pub fn new(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Cookie returned by an activation. Zero means nothing was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationCookie(usize);

impl ActivationCookie {
    pub const NONE: Self = Self(0);

    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// The kernel32 activation-context operations.
pub trait ActCtxBackend {
    /// `GetCurrentActCtx`. `None` when the call fails or yields the null handle.
    fn current(&self) -> Option<ContextHandle>;

    /// `AddRefActCtx`.
    fn add_ref(&self, ctx: ContextHandle);

    /// `ActivateActCtx`. Returns the cookie, or `None` on failure.
    fn activate(&self, ctx: ContextHandle) -> Option<usize>;

    /// `DeactivateActCtx(0, cookie)`.
    fn deactivate(&self, cookie: usize) -> bool;

    /// `ReleaseActCtx`.
    fn release(&self, ctx: ContextHandle);
}

/// Outcome of probing the OS for the activation-context API, computed once
/// at startup.
pub enum ActCtxSupport {
    /// `GetCurrentActCtx` is missing; no scoping is attempted.
    Unavailable,
    /// All operations resolved.
    Available(Box<dyn ActCtxBackend>),
}

/// The process default activation context, pinned for the lifetime of the
/// bootstrap.
///
/// Constructed once at the outermost scope and passed by reference to every
/// load. Dropping it (or calling [`ActivationContext::unload`]) releases the
/// pinned context.
pub struct ActivationContext {
    backend: Option<Box<dyn ActCtxBackend>>,
    pinned: Option<ContextHandle>,
}

impl ActivationContext {
    /// Capture and pin the current activation context.
    pub fn load(support: ActCtxSupport) -> Self {
        let backend = match support {
            ActCtxSupport::Unavailable => {
                debug!("activation context API unavailable, native loads run unscoped");
                return Self::disabled();
            }
            ActCtxSupport::Available(backend) => backend,
        };

        let pinned = match backend.current() {
            Some(ctx) => {
                backend.add_ref(ctx);
                debug!(ctx = ?ctx.as_raw(), "pinned default activation context");
                Some(ctx)
            }
            None => {
                warn!("failed to load the default activation context");
                None
            }
        };

        Self {
            backend: Some(backend),
            pinned,
        }
    }

    /// A context that never activates anything.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            pinned: None,
        }
    }

    /// Whether a context was captured at load time.
    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// Activate the pinned context. Returns [`ActivationCookie::NONE`] when
    /// nothing is pinned or activation fails.
    pub fn activate(&self) -> ActivationCookie {
        let (Some(backend), Some(ctx)) = (&self.backend, self.pinned) else {
            return ActivationCookie::NONE;
        };

        match backend.activate(ctx) {
            Some(cookie) => ActivationCookie(cookie),
            None => {
                // The failing call may have written the cookie anyway.
                warn!("failed to activate the activation context before loading a native image");
                ActivationCookie::NONE
            }
        }
    }

    /// Restore the context that was active before `cookie` was issued.
    /// A zero cookie is a no-op.
    pub fn deactivate(&self, cookie: ActivationCookie) {
        if cookie.is_none() {
            return;
        }
        let Some(backend) = &self.backend else {
            return;
        };
        if !backend.deactivate(cookie.0) {
            warn!(cookie = cookie.0, "failed to deactivate the activation context");
        }
    }

    /// Activate for the lifetime of the returned guard.
    pub fn scope(&self) -> ActivationScope<'_> {
        ActivationScope {
            ctx: self,
            cookie: self.activate(),
        }
    }

    /// Release the pinned context.
    pub fn unload(self) {
        drop(self);
    }
}

impl Drop for ActivationContext {
    fn drop(&mut self) {
        if let (Some(backend), Some(ctx)) = (&self.backend, self.pinned.take()) {
            backend.release(ctx);
            debug!(ctx = ?ctx.as_raw(), "released default activation context");
        }
    }
}

/// An outstanding activation, undone on drop.
pub struct ActivationScope<'a> {
    ctx: &'a ActivationContext,
    cookie: ActivationCookie,
}

impl ActivationScope<'_> {
    pub fn cookie(&self) -> ActivationCookie {
        self.cookie
    }
}

impl Drop for ActivationScope<'_> {
    fn drop(&mut self) {
        self.ctx.deactivate(self.cookie);
    }
}

// ============================================================================
// kernel32 backend
// ============================================================================

#[cfg(windows)]
type GetCurrentActCtxFn = unsafe extern "system" fn(*mut *mut c_void) -> i32;
#[cfg(windows)]
type ActivateActCtxFn = unsafe extern "system" fn(*mut c_void, *mut usize) -> i32;
#[cfg(windows)]
type DeactivateActCtxFn = unsafe extern "system" fn(u32, usize) -> i32;
#[cfg(windows)]
type AddRefActCtxFn = unsafe extern "system" fn(*mut c_void);
#[cfg(windows)]
type ReleaseActCtxFn = unsafe extern "system" fn(*mut c_void);

/// Activation-context functions resolved from kernel32 at runtime.
#[cfg(windows)]
pub struct Kernel32ActCtx {
    get_current: GetCurrentActCtxFn,
    activate: ActivateActCtxFn,
    deactivate: DeactivateActCtxFn,
    add_ref: AddRefActCtxFn,
    release: ReleaseActCtxFn,
}

#[cfg(windows)]
impl Kernel32ActCtx {
    /// Look the API up in kernel32. Pre-XP systems lack `GetCurrentActCtx`.
    pub fn probe() -> ActCtxSupport {
        match unsafe { Self::resolve() } {
            Some(backend) => ActCtxSupport::Available(Box::new(backend)),
            None => ActCtxSupport::Unavailable,
        }
    }

    unsafe fn resolve() -> Option<Self> {
        use crate::sys;

        let kernel32 = sys::GetModuleHandleW(sys::wide("kernel32.dll").as_ptr());
        if kernel32.is_null() {
            return None;
        }

        let get_current = sys::proc_address(kernel32, c"GetCurrentActCtx")?;
        let activate = sys::proc_address(kernel32, c"ActivateActCtx")?;
        let deactivate = sys::proc_address(kernel32, c"DeactivateActCtx")?;
        let add_ref = sys::proc_address(kernel32, c"AddRefActCtx")?;
        let release = sys::proc_address(kernel32, c"ReleaseActCtx")?;

        Some(Self {
            get_current: std::mem::transmute::<*mut c_void, GetCurrentActCtxFn>(get_current.as_ptr()),
            activate: std::mem::transmute::<*mut c_void, ActivateActCtxFn>(activate.as_ptr()),
            deactivate: std::mem::transmute::<*mut c_void, DeactivateActCtxFn>(deactivate.as_ptr()),
            add_ref: std::mem::transmute::<*mut c_void, AddRefActCtxFn>(add_ref.as_ptr()),
            release: std::mem::transmute::<*mut c_void, ReleaseActCtxFn>(release.as_ptr()),
        })
    }
}

#[cfg(windows)]
impl ActCtxBackend for Kernel32ActCtx {
    fn current(&self) -> Option<ContextHandle> {
        let mut handle = std::ptr::null_mut();
        if unsafe { (self.get_current)(&mut handle) } == 0 {
            return None;
        }
        ContextHandle::new(handle)
    }

    fn add_ref(&self, ctx: ContextHandle) {
        unsafe { (self.add_ref)(ctx.as_raw()) }
    }

    fn activate(&self, ctx: ContextHandle) -> Option<usize> {
        let mut cookie = 0usize;
        if unsafe { (self.activate)(ctx.as_raw(), &mut cookie) } == 0 {
            return None;
        }
        Some(cookie)
    }

    fn deactivate(&self, cookie: usize) -> bool {
        unsafe { (self.deactivate)(0, cookie) != 0 }
    }

    fn release(&self, ctx: ContextHandle) {
        unsafe { (self.release)(ctx.as_raw()) }
    }
}
