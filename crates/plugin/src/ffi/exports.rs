//! C-compatible exports
//!
//! Conventions shared by every export:
//! - Strings in are null-terminated UTF-8; a null or invalid string fails the call.
//! - `error`/`maxlen` pairs receive a null-terminated message on failure.
//! - Text out goes to an `out`/`maxlen` buffer. The return value is the full
//!   length of the text (without terminator), or -1 on failure; a result of
//!   `maxlen` or more means the text was truncated.

use std::ffi::{c_char, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tracing::instrument;
use tracing_subscriber::EnvFilter;

use propsys_core::{ApplyOptions, ConfigFile, CoreConfig};

use super::context::{PropsysContext, PropsysRecord};

static VERSION: &[u8] = b"0.1.0\0";

/// Initialize logging
///
/// `RUST_LOG` wins when set; otherwise `log_filter` is used, or `info` if it
/// is null. Calling this more than once is harmless.
///
/// # Safety
/// - `log_filter` must be a valid null-terminated C string or null
#[no_mangle]
pub unsafe extern "C" fn propsys_init(log_filter: *const c_char) -> bool {
    let directive = c_str(log_filter).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let fresh = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if fresh {
        tracing::info!("propsys {} initialized", env!("CARGO_PKG_VERSION"));
    }
    true
}

#[no_mangle]
pub extern "C" fn propsys_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Context
// ============================================================================

/// Create a context, loading settings from `config_path`
///
/// A null path uses default settings. A missing file is created with the
/// defaults. Returns null on failure.
///
/// # Safety
/// - `config_path` must be a valid null-terminated C string or null
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn propsys_context_create(
    config_path: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> *mut PropsysContext {
    let config = if config_path.is_null() {
        CoreConfig::default()
    } else {
        let Some(path) = c_str(config_path) else {
            write_error(error, maxlen, "Config path is not valid UTF-8");
            return std::ptr::null_mut();
        };
        match CoreConfig::load(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load core config: {}", e);
                write_error(error, maxlen, &e.to_string());
                return std::ptr::null_mut();
            }
        }
    };
    Box::into_raw(Box::new(PropsysContext::new(config)))
}

/// Destroy a context created by [`propsys_context_create`]
///
/// # Safety
/// - `ctx` must come from [`propsys_context_create`] and not be used afterwards, or be null
/// - Every record created from `ctx` must already be destroyed
#[no_mangle]
pub unsafe extern "C" fn propsys_context_destroy(ctx: *mut PropsysContext) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx));
    }
}

/// Register the types in a JSON schema document
///
/// Returns the number of record types registered, or -1 on failure.
///
/// # Safety
/// - `ctx` must be a live context
/// - `json` must be a valid null-terminated C string
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn propsys_load_schema_json(
    ctx: *mut PropsysContext,
    json: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> c_int {
    let (Some(ctx), Some(json)) = (ctx.as_ref(), c_str(json)) else {
        write_error(error, maxlen, "Invalid context or schema text");
        return -1;
    };
    guarded(error, maxlen, -1, || {
        ctx.registry
            .load_schema_json(json, &ctx.services)
            .map(|records| records.len() as c_int)
            .map_err(|e| e.to_string())
    })
}

/// Read and register a JSON schema file
///
/// Returns the number of record types registered, or -1 on failure.
///
/// # Safety
/// - `ctx` must be a live context
/// - `path` must be a valid null-terminated C string
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn propsys_load_schema_file(
    ctx: *mut PropsysContext,
    path: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> c_int {
    let (Some(ctx), Some(path)) = (ctx.as_ref(), c_str(path)) else {
        write_error(error, maxlen, "Invalid context or path");
        return -1;
    };
    guarded(error, maxlen, -1, || {
        ctx.registry
            .load_schema_file(Path::new(path), &ctx.services)
            .map(|records| records.len() as c_int)
            .map_err(|e| e.to_string())
    })
}

// ============================================================================
// Records
// ============================================================================

/// Create an initialized instance of a registered record type
///
/// Returns null on failure.
///
/// # Safety
/// - `ctx` must be a live context
/// - `type_name` must be a valid null-terminated C string
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_create(
    ctx: *mut PropsysContext,
    type_name: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> *mut PropsysRecord {
    let (Some(ctx), Some(type_name)) = (ctx.as_ref(), c_str(type_name)) else {
        write_error(error, maxlen, "Invalid context or type name");
        return std::ptr::null_mut();
    };
    match ctx.registry.instantiate(type_name) {
        Ok(value) => Box::into_raw(Box::new(PropsysRecord { value })),
        Err(e) => {
            write_error(error, maxlen, &e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Destroy a record created by [`propsys_record_create`]
///
/// # Safety
/// - `record` must come from [`propsys_record_create`] and not be used afterwards, or be null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_destroy(record: *mut PropsysRecord) {
    if !record.is_null() {
        drop(Box::from_raw(record));
    }
}

/// Write the text form of element `index` of a field into `out`
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `field` must be a valid null-terminated C string
/// - `out` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_export_field(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    field: *const c_char,
    index: usize,
    out: *mut c_char,
    maxlen: usize,
) -> isize {
    let (Some(ctx), Some(record), Some(field)) = (ctx.as_ref(), record.as_ref(), c_str(field))
    else {
        return -1;
    };
    match record.value.export_field(field, index, &ctx.port()) {
        Ok(text) => write_output(out, maxlen, &text),
        Err(e) => {
            tracing::debug!("Export of '{}[{}]' failed: {}", field, index, e);
            -1
        }
    }
}

/// Parse `text` into element `index` of a field
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `field` and `text` must be valid null-terminated C strings
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_import_field(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    field: *const c_char,
    index: usize,
    text: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> bool {
    let (Some(ctx), Some(record), Some(field), Some(text)) =
        (ctx.as_ref(), record.as_mut(), c_str(field), c_str(text))
    else {
        write_error(error, maxlen, "Invalid arguments");
        return false;
    };
    guarded(error, maxlen, false, || {
        record
            .value
            .import_field(field, index, text, &ctx.port())
            .map(|()| true)
            .map_err(|e| e.to_string())
    })
}

/// Write the text form of the whole record into `out`
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `out` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_export_text(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    out: *mut c_char,
    maxlen: usize,
) -> isize {
    let (Some(ctx), Some(record)) = (ctx.as_ref(), record.as_ref()) else {
        return -1;
    };
    write_output(out, maxlen, &record.value.export_text(&ctx.port()))
}

/// Parse the whole-record text form, e.g. `(id=5,tags=("a","b"))`
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `text` must be a valid null-terminated C string
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_record_import_text(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    text: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> bool {
    let (Some(ctx), Some(record), Some(text)) = (ctx.as_ref(), record.as_mut(), c_str(text))
    else {
        write_error(error, maxlen, "Invalid arguments");
        return false;
    };
    guarded(error, maxlen, false, || {
        record
            .value
            .import_text(text, &ctx.port())
            .map(|()| true)
            .map_err(|e| e.to_string())
    })
}

// ============================================================================
// Config persistence
// ============================================================================

/// Apply one section of ini text to a record's `CONFIG` fields
///
/// Unknown keys are errors when the context's `strict_import` is set, and
/// indexed keys may grow an array up to `max_config_array_len` elements.
/// Returns the number of lines applied, or -1 on failure.
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `ini_text` and `section` must be valid null-terminated C strings
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn propsys_config_apply(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    ini_text: *const c_char,
    section: *const c_char,
    error: *mut c_char,
    maxlen: usize,
) -> c_int {
    let (Some(ctx), Some(record), Some(ini_text), Some(section)) =
        (ctx.as_ref(), record.as_mut(), c_str(ini_text), c_str(section))
    else {
        write_error(error, maxlen, "Invalid arguments");
        return -1;
    };
    guarded(error, maxlen, -1, || {
        let file = ConfigFile::parse(ini_text);
        let record_type = std::sync::Arc::clone(record.value.record());
        file.apply_to(
            section,
            &record_type,
            record.value.as_value_mut(),
            &ctx.port(),
            &ApplyOptions::from(&ctx.config),
        )
        .map(|applied| applied as c_int)
        .map_err(|e| e.to_string())
    })
}

/// Write a record's `CONFIG` fields as one ini section into `out`
///
/// # Safety
/// - `ctx` and `record` must be live
/// - `section` must be a valid null-terminated C string
/// - `out` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
#[no_mangle]
pub unsafe extern "C" fn propsys_config_store(
    ctx: *mut PropsysContext,
    record: *mut PropsysRecord,
    section: *const c_char,
    out: *mut c_char,
    maxlen: usize,
) -> isize {
    let (Some(ctx), Some(record), Some(section)) = (ctx.as_ref(), record.as_ref(), c_str(section))
    else {
        return -1;
    };
    let mut file = ConfigFile::new();
    match file.store_from(section, record.value.record(), record.value.as_value(), &ctx.port()) {
        Ok(()) => write_output(out, maxlen, &file.to_string()),
        Err(e) => {
            tracing::warn!("Storing config section [{}] failed: {}", section, e);
            -1
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Borrow a C string as UTF-8
///
/// # Safety
/// - `ptr` must be a valid null-terminated C string or null
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Run `f`, reporting its error or a panic through `error`
///
/// # Safety
/// - `error` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
unsafe fn guarded<T>(
    error: *mut c_char,
    maxlen: usize,
    failed: T,
    f: impl FnOnce() -> Result<T, String>,
) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(msg)) => {
            write_error(error, maxlen, &msg);
            failed
        }
        Err(_) => {
            tracing::error!("Panic inside FFI call");
            write_error(error, maxlen, "Internal panic");
            failed
        }
    }
}

/// Copy `text` into a C buffer, truncating; returns the full length
///
/// # Safety
/// - `out` must be a valid pointer to a buffer of at least `maxlen` bytes, or null
unsafe fn write_output(out: *mut c_char, maxlen: usize, text: &str) -> isize {
    write_error(out, maxlen, text);
    text.len() as isize
}

/// Helper to write an error message to a C buffer
///
/// # Safety
/// - `error` must be a valid pointer or null
/// - `maxlen` must accurately reflect the buffer size
unsafe fn write_error(error: *mut c_char, maxlen: usize, msg: &str) {
    if !error.is_null() && maxlen > 0 {
        let bytes = msg.as_bytes();
        let len = bytes.len().min(maxlen - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), error as *mut u8, len);
        *error.add(len) = 0;
    }
}
