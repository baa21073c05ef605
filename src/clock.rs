use std::cell::RefCell;

use chrono::{Datelike, Local, Timelike};

use crate::buffer::Buffer;

/// Length of a formatted `YYYY-MM-DD HH:MM:SS.mmm` timestamp.
pub(crate) const TIMESTAMP_LEN: usize = 23;

const PREFIX_LEN: usize = 19;

thread_local! {
    // The date-time prefix only changes once per second, while records are
    // stamped millions of times per second under load; each thread keeps the
    // formatted prefix of the last-seen second.
    static PREFIX_CACHE: RefCell<(i64, [u8; PREFIX_LEN])> =
        const { RefCell::new((i64::MIN, [0; PREFIX_LEN])) };
}

/// Appends the current local time as `YYYY-MM-DD HH:MM:SS.mmm`.
///
/// Returns `false` (leaving the buffer unchanged) if the 23 bytes do not fit.
pub(crate) fn append_timestamp(buffer: &mut Buffer) -> bool {
    let mut out = [0_u8; TIMESTAMP_LEN];
    write_now(&mut out);
    buffer.append(&out)
}

/// The current local time as an owned `YYYY-MM-DD HH:MM:SS.mmm` string, used
/// for log file names.
pub(crate) fn now_string() -> String {
    let mut out = [0_u8; TIMESTAMP_LEN];
    write_now(&mut out);
    String::from_utf8(out.to_vec()).expect("timestamps are pure ASCII")
}

fn write_now(out: &mut [u8; TIMESTAMP_LEN]) {
    let now = Local::now();
    let second = now.timestamp();

    PREFIX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.0 != second {
            let prefix = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                now.year(),
                now.month(),
                now.day(),
                now.hour(),
                now.minute(),
                now.second(),
            );
            cache.1.copy_from_slice(prefix.as_bytes());
            cache.0 = second;
        }
        out[..PREFIX_LEN].copy_from_slice(&cache.1);
    });

    out[PREFIX_LEN] = b'.';
    push_millis(out, now.timestamp_subsec_millis());
}

#[allow(clippy::cast_possible_truncation)]
fn push_millis(out: &mut [u8; TIMESTAMP_LEN], millis: u32) {
    // Leap seconds surface as a subsecond value of 1000..=1999.
    let millis = millis.min(999);
    out[20] = b'0' + (millis / 100) as u8;
    out[21] = b'0' + (millis / 10 % 10) as u8;
    out[22] = b'0' + (millis % 10) as u8;
}
