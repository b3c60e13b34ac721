use crate::{
    admin,
    config::TrackerConfig,
    constants::ETH_ALEN,
    errors::{map_error, set_last_error, ErrorCode},
    types::MacAddr,
    Registry,
};
use log::error;
use std::{net::Ipv4Addr, os::raw::c_char};

/// A registry plus the runtime that drives its expiry timers.
///
/// Field order matters: the registry (and with it every timer) goes away
/// before the runtime is shut down.
pub struct Tracker {
    registry: Registry,
    _runtime: tokio::runtime::Runtime,
}

impl Tracker {
    pub fn open(config: TrackerConfig) -> Result<Self, ErrorCode> {
        config.validate().map_err(|e| {
            error!("[OPEN] {e}");
            map_error(&e)
        })?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("termtrack-timer")
            .enable_time()
            .build()
            .map_err(|e| {
                error!("[OPEN] timer runtime failed: {e}");
                ErrorCode::RuntimeFailed
            })?;
        let registry = Registry::with_runtime(config, runtime.handle().clone())
            .map_err(|e| map_error(&e))?;
        Ok(Self {
            registry,
            _runtime: runtime,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Opaque handle – **always** treated as owned by the caller.
pub type TermHandle = *mut Tracker;

// ─────────────────────────── helpers ─────────────────────────────────── //

#[inline]
fn mac_from_ptr(p: *const u8) -> Result<MacAddr, ErrorCode> {
    if p.is_null() {
        return Err(ErrorCode::InvalidMac);
    }
    let mut bytes = [0u8; ETH_ALEN];
    unsafe { std::ptr::copy_nonoverlapping(p, bytes.as_mut_ptr(), ETH_ALEN) };
    Ok(MacAddr::new(bytes))
}

#[inline]
fn tracker<'a>(h: TermHandle) -> Result<&'a Tracker, ErrorCode> {
    unsafe { h.as_ref() }.ok_or(ErrorCode::InvalidHandle)
}

#[inline]
fn report(res: Result<(), ErrorCode>) -> ErrorCode {
    let code = match res {
        Ok(()) => ErrorCode::Success,
        Err(code) => code,
    };
    set_last_error(code);
    code
}

// ─── small helper to turn Result<T,ErrorCode> into early-return ──────────
macro_rules! try_c { ($expr:expr) => { match $expr {
    Ok(v)  => v,
    Err(e) => return report(Err(e)),
}}}

// ───────────────────────── lifetime ──────────────────────────────────── //

/// Create a tracker. `hash_bits == 0` picks the default bucket count.
/// Returns `Success` **and** stores the handle in `*out`
/// -- or an error code otherwise.
#[no_mangle]
pub extern "C" fn term_open(
    ttl_secs: u64,
    capacity: usize,
    hash_bits: u8,
    out: *mut TermHandle,
) -> ErrorCode {
    if out.is_null() {
        return report(Err(ErrorCode::InvalidHandle));
    }
    let mut config = TrackerConfig {
        ttl_secs,
        capacity,
        ..TrackerConfig::default()
    };
    if hash_bits != 0 {
        config.hash_bits = hash_bits;
    }
    report(Tracker::open(config).map(|t| unsafe {
        *out = Box::into_raw(Box::new(t));
    }))
}

/// Cancels every timer and frees every terminal.
#[no_mangle]
pub extern "C" fn term_close(h: TermHandle) {
    if !h.is_null() {
        unsafe { drop(Box::from_raw(h)) };
    }
}

// ───────────────────────── packet path ───────────────────────────────── //

/// `ip_be` is the IPv4 address in network byte order.
#[no_mangle]
pub extern "C" fn term_add(h: TermHandle, mac: *const u8, ip_be: u32) -> ErrorCode {
    let t = try_c!(tracker(h));
    let mac = try_c!(mac_from_ptr(mac));
    let ip = Ipv4Addr::from(u32::from_be(ip_be));
    report(t.registry.insert(mac, ip).map_err(|e| map_error(&e)))
}

/// Unknown terminals, bad handles and bad pointers all answer `false`.
#[no_mangle]
pub extern "C" fn term_is_authed(h: TermHandle, mac: *const u8) -> bool {
    match (tracker(h), mac_from_ptr(mac)) {
        (Ok(t), Ok(mac)) => t.registry.is_authenticated(&mac),
        _ => false,
    }
}

#[no_mangle]
pub extern "C" fn term_mark_active(h: TermHandle, mac: *const u8) -> ErrorCode {
    let t = try_c!(tracker(h));
    let mac = try_c!(mac_from_ptr(mac));
    report(t.registry.mark_active(&mac).map_err(|e| map_error(&e)))
}

#[no_mangle]
pub extern "C" fn term_account(h: TermHandle, mac: *const u8, rx: u64, tx: u64) -> ErrorCode {
    let t = try_c!(tracker(h));
    let mac = try_c!(mac_from_ptr(mac));
    report(t.registry.account(&mac, rx, tx).map_err(|e| map_error(&e)))
}

// ───────────────────────── administration ────────────────────────────── //

#[no_mangle]
pub extern "C" fn term_mark(h: TermHandle, mac: *const u8, authed: bool) -> ErrorCode {
    let t = try_c!(tracker(h));
    let mac = try_c!(mac_from_ptr(mac));
    report(
        t.registry
            .set_authenticated(&mac, authed)
            .map_err(|e| map_error(&e)),
    )
}

#[no_mangle]
pub extern "C" fn term_clear(h: TermHandle) -> ErrorCode {
    let t = try_c!(tracker(h));
    t.registry.clear_all();
    report(Ok(()))
}

#[no_mangle]
pub extern "C" fn term_count(h: TermHandle, out: *mut u64) -> ErrorCode {
    if out.is_null() {
        return report(Err(ErrorCode::InvalidHandle));
    }
    let t = try_c!(tracker(h));
    unsafe { *out = t.registry.len() as u64 };
    report(Ok(()))
}

/// Feed one control command (`clear`, `+MAC`, `-MAC`). Returns the bytes
/// consumed; malformed commands are logged, never reported.
#[no_mangle]
pub extern "C" fn term_control_write(h: TermHandle, buf: *const u8, len: usize) -> usize {
    let Ok(t) = tracker(h) else { return 0 };
    if buf.is_null() || len == 0 {
        return 0;
    }
    let slice = unsafe { std::slice::from_raw_parts(buf, len) };
    admin::control_write(&t.registry, slice)
}

/// Render the listing into `buf` (NUL-terminated). `*out_len` always gets
/// the full length without the NUL, so callers can retry with a bigger
/// buffer on `BufferTooSmall`.
#[no_mangle]
pub extern "C" fn term_listing(
    h: TermHandle,
    buf: *mut c_char,
    cap: usize,
    out_len: *mut usize,
) -> ErrorCode {
    let t = try_c!(tracker(h));
    let text = admin::render_listing(&t.registry);
    if !out_len.is_null() {
        unsafe { *out_len = text.len() };
    }
    if buf.is_null() || cap <= text.len() {
        return report(Err(ErrorCode::BufferTooSmall));
    }
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr(), buf as *mut u8, text.len());
        *buf.add(text.len()) = 0;
    }
    report(Ok(()))
}
