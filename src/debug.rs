//! Debug provenance: recording where each `_dbg` allocation came from, for
//! the leak report rendered by `diagnostics::print_leak_info`.
//!
//! Grounded on the original `pad_dbg_block`: the caller's file/function
//! names are copied in, truncated to fit the fixed-size fields, the file
//! name is reduced to its basename (Windows and Unix separators both
//! recognized since callers may cross-compile `file!()` from either), and
//! the current thread id and a human-readable timestamp are stamped in.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::page::{DebugBlockHeader, DATE_FIELD_LEN, FILE_FIELD_LEN, FUNC_FIELD_LEN};

/// Fills every provenance field of a freshly carved debug block.
///
/// # Safety
/// `header` must point to a live `DebugBlockHeader`.
pub unsafe fn fill_provenance(header: *mut DebugBlockHeader, file: &str, line: i32, func: &str) {
    (*header).line = line;
    (*header).thread = current_thread_id();
    write_timestamp(&mut (*header).date);
    write_truncated(basename(file), &mut (*header).file);
    write_truncated(func, &mut (*header).func);
}

/// Strips a leading directory path using either separator, matching
/// `file!()` output from any host platform.
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Copies `text` into `field` as a NUL-terminated, possibly-truncated C
/// string; `field` must be at least 1 byte so the terminator always fits.
fn write_truncated(text: &str, field: &mut [u8]) {
    let capacity = field.len() - 1;
    let bytes = text.as_bytes();
    let take = bytes.len().min(capacity);
    field[..take].copy_from_slice(&bytes[..take]);
    field[take] = 0;
    for b in &mut field[take + 1..] {
        *b = 0;
    }
}

/// Renders a NUL-terminated field back into a displayable string, for the
/// diagnostics sink.
pub fn field_to_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).unwrap_or("<invalid utf8>")
}

fn write_timestamp(field: &mut [u8; DATE_FIELD_LEN]) {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let text = format_epoch_secs(secs);
    write_truncated(&text, field);
}

/// Formats a Unix timestamp as `YYYY-MM-DD HH:MM:SS` UTC, matching the
/// original's `strftime("%Y-%m-%d %H:%M:%S", ...)` without pulling in a
/// calendar dependency for one call site.
fn format_epoch_secs(secs: u64) -> String {
    const SECS_PER_DAY: u64 = 86_400;
    let days = secs / SECS_PER_DAY;
    let time_of_day = secs % SECS_PER_DAY;
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);

    let mut year = 1970i64;
    let mut remaining_days = days as i64;
    loop {
        let len = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < len {
            break;
        }
        remaining_days -= len;
        year += 1;
    }
    let month_lengths = [
        31,
        if is_leap_year(year) { 29 } else { 28 },
        31, 30, 31, 30, 31, 31, 30, 31, 30, 31,
    ];
    let mut month = 0usize;
    for &len in &month_lengths {
        if remaining_days < len {
            break;
        }
        remaining_days -= len;
        month += 1;
    }
    let day = remaining_days + 1;

    format!(
        "{year:04}-{:02}-{day:02} {hour:02}:{minute:02}:{second:02}",
        month + 1
    )
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(unix)]
fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

#[cfg(windows)]
fn current_thread_id() -> u64 {
    unsafe { winapi::um::processthreadsapi::GetCurrentThreadId() as u64 }
}

#[cfg(all(not(unix), not(windows)))]
fn current_thread_id() -> u64 {
    0
}
