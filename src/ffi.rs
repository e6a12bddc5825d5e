//! FFI bindings for Synheart Rules
//!
//! This module provides C-compatible functions for calling the rule engine from
//! other languages. All functions use C strings (null-terminated) and return
//! allocated memory that must be freed by the caller using `rules_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::normalizer::parse_date;
use crate::pipeline::{features_json, simulate_json, RulesEngine};
use crate::providers::{InMemoryAuditLog, InMemoryHistory, InMemoryRules};
use crate::schema::{HistoryLoader, RuleLoader};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return a result string to C, or record the error and return NULL
fn into_c_result(result: Result<String, EngineError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Evaluate a self-contained simulation request and return the result JSON.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rules_free_string`.
/// - Returns NULL on error; call `rules_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rules_simulate(request: *const c_char) -> *mut c_char {
    clear_last_error();

    let request = match cstr_to_string(request) {
        Some(s) => s,
        None => {
            set_last_error("Invalid request string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(simulate_json(&request))
}

/// Build a feature snapshot from a self-contained request and return it as JSON.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rules_free_string`.
/// - Returns NULL on error; call `rules_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rules_features(request: *const c_char) -> *mut c_char {
    clear_last_error();

    let request = match cstr_to_string(request) {
        Some(s) => s,
        None => {
            set_last_error("Invalid request string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(features_json(&request))
}

// ============================================================================
// Stateful Engine API
// ============================================================================

/// Opaque handle holding a rule set and an audit log that persists across calls
pub struct RulesEngineHandle {
    rules: Arc<InMemoryRules>,
    audits: Arc<InMemoryAuditLog>,
    config: EngineConfig,
}

impl RulesEngineHandle {
    fn evaluate(&self, history_json: &str, user_id: &str, date: &str, debug: bool) -> Result<String, EngineError> {
        let date = parse_date(date).ok_or_else(|| EngineError::DateParseError(date.to_string()))?;
        let history = HistoryLoader::parse(history_json)?;

        let engine = RulesEngine::new(
            Arc::new(InMemoryHistory::new(history)),
            self.rules.clone(),
            self.audits.clone(),
            self.config.clone(),
        );
        let result = engine.evaluate_user(user_id, date, None, debug)?;
        Ok(serde_json::to_string(&result)?)
    }
}

/// Create an engine from a rule document and an optional JSON config.
///
/// # Safety
/// - `rules_json` must be a valid null-terminated C string (JSON array or NDJSON).
/// - `config_json` may be NULL for the default configuration.
/// - Must be freed with `rules_engine_free`.
/// - Returns NULL on error; call `rules_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rules_engine_new(
    rules_json: *const c_char,
    config_json: *const c_char,
) -> *mut RulesEngineHandle {
    clear_last_error();

    let rules_str = match cstr_to_string(rules_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid rules string pointer");
            return ptr::null_mut();
        }
    };

    let config = match cstr_to_string(config_json) {
        None => EngineConfig::default(),
        Some(s) => match EngineConfig::from_json(&s) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
    };

    let rules = match RuleLoader::parse(&rules_str) {
        Ok(rules) => rules,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let handle = Box::new(RulesEngineHandle {
        rules: Arc::new(InMemoryRules::new(rules)),
        audits: Arc::new(InMemoryAuditLog::new()),
        config,
    });
    Box::into_raw(handle)
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `rules_engine_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rules_engine_free(engine: *mut RulesEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Evaluate one user and date with the engine's rules and audit log.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `rules_engine_new`.
/// - `history_json`, `user_id` and `date` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `rules_free_string`.
/// - Returns NULL on error; call `rules_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rules_engine_evaluate(
    engine: *const RulesEngineHandle,
    history_json: *const c_char,
    user_id: *const c_char,
    date: *const c_char,
    debug: bool,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let history_str = match cstr_to_string(history_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid history string pointer");
            return ptr::null_mut();
        }
    };

    let user_str = match cstr_to_string(user_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid user_id string pointer");
            return ptr::null_mut();
        }
    };

    let date_str = match cstr_to_string(date) {
        Some(s) => s,
        None => {
            set_last_error("Invalid date string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(handle.evaluate(&history_str, &user_str, &date_str, debug))
}

/// Save the engine's audit log as a JSON array.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `rules_engine_new`.
/// - Returns a newly allocated string that must be freed with `rules_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn rules_engine_save_audits(engine: *const RulesEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    into_c_result((*engine).audits.to_json())
}

/// Replace the engine's audit log with entries from a JSON array.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `rules_engine_new`.
/// - `audits_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rules_engine_load_audits(
    engine: *mut RulesEngineHandle,
    audits_json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let json_str = match cstr_to_string(audits_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid audits string pointer");
            return -1;
        }
    };

    match InMemoryAuditLog::from_json(&json_str) {
        Ok(log) => {
            handle.audits = Arc::new(log);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by rules functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a rules function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rules_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next rules function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn rules_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn rules_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_rules() -> CString {
        CString::new(
            r#"[{
                "id": "low_steps",
                "category": "activity",
                "cooldown_days": 3,
                "logic": {"var": "steps", "op": "<", "value": 5000},
                "messages": [{"id": 1, "text": "Only {{steps}} steps"}]
            }]"#,
        )
        .unwrap()
    }

    fn sample_history() -> CString {
        CString::new(
            r#"[
                {"user_id": "u1", "date": "2024-06-09", "steps": 4000},
                {"user_id": "u1", "date": "2024-06-10", "steps": 3000}
            ]"#,
        )
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        rules_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_simulate() {
        let request = CString::new(
            r#"{
                "user_id": "u1",
                "date": "2024-06-10",
                "seed": 1,
                "history": [{"user_id": "u1", "date": "2024-06-10", "steps": 800}],
                "rules": [{
                    "id": "r1",
                    "category": "activity",
                    "logic": {"var": "steps", "op": "<", "value": 1000},
                    "messages": [{"id": 1, "text": "Move a little"}]
                }]
            }"#,
        )
        .unwrap();

        unsafe {
            let result = take_string(rules_simulate(request.as_ptr()));
            assert!(result.contains("Move a little"));
        }
    }

    #[test]
    fn test_ffi_features() {
        let request = CString::new(
            r#"{"user_id": "u1", "date": "2024-06-10", "history": [{"user_id": "u1", "date": "2024-06-10", "steps": 800}]}"#,
        )
        .unwrap();

        unsafe {
            let result = take_string(rules_features(request.as_ptr()));
            let snapshot: serde_json::Value = serde_json::from_str(&result).unwrap();
            assert_eq!(snapshot["steps"]["current"], 800.0);
        }
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        let rules = sample_rules();
        let history = sample_history();
        let user = CString::new("u1").unwrap();
        let day_one = CString::new("2024-06-09").unwrap();
        let day_two = CString::new("2024-06-10").unwrap();

        unsafe {
            let engine = rules_engine_new(rules.as_ptr(), ptr::null());
            assert!(!engine.is_null());

            let first = take_string(rules_engine_evaluate(
                engine,
                history.as_ptr(),
                user.as_ptr(),
                day_one.as_ptr(),
                false,
            ));
            let first: serde_json::Value = serde_json::from_str(&first).unwrap();
            assert_eq!(first["events"].as_array().unwrap().len(), 1);

            // Audit from day one puts the rule in cooldown on day two
            let second = take_string(rules_engine_evaluate(
                engine,
                history.as_ptr(),
                user.as_ptr(),
                day_two.as_ptr(),
                false,
            ));
            let second: serde_json::Value = serde_json::from_str(&second).unwrap();
            assert!(second["events"].as_array().unwrap().is_empty());

            // Audits survive a save/load into a fresh engine
            let saved = rules_engine_save_audits(engine);
            assert!(!saved.is_null());
            let engine2 = rules_engine_new(rules.as_ptr(), ptr::null());
            assert_eq!(rules_engine_load_audits(engine2, saved), 0);
            rules_free_string(saved);

            let third = take_string(rules_engine_evaluate(
                engine2,
                history.as_ptr(),
                user.as_ptr(),
                day_two.as_ptr(),
                false,
            ));
            let third: serde_json::Value = serde_json::from_str(&third).unwrap();
            assert!(third["events"].as_array().unwrap().is_empty());

            rules_engine_free(engine);
            rules_engine_free(engine2);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid = CString::new("not json").unwrap();
            let result = rules_simulate(invalid.as_ptr());
            assert!(result.is_null());

            let error = rules_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            assert!(rules_simulate(ptr::null()).is_null());
            assert!(rules_engine_new(invalid.as_ptr(), ptr::null()).is_null());
            assert!(rules_engine_evaluate(ptr::null(), invalid.as_ptr(), invalid.as_ptr(), invalid.as_ptr(), false).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = rules_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
