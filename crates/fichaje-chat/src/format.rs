//! Spanish display strings for timestamps, last-seen text and clip
//! durations, matching what the marketplace shows its users.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};

const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const MONTHS_SHORT: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

/// Header status line: typing beats online beats last-seen age.
pub fn last_seen_text(
    online: bool,
    typing: bool,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    if typing {
        return "Escribiendo...".to_string();
    }
    if online {
        return "En línea".to_string();
    }
    let last_seen = match last_seen {
        Some(ts) => ts,
        None => return "Desconectado".to_string(),
    };

    let minutes = now.signed_duration_since(last_seen).num_minutes().max(0);
    if minutes < 60 {
        format!("Hace {} min{}", minutes, plural(minutes, "s"))
    } else if minutes < 1440 {
        let hours = minutes / 60;
        format!("Hace {} hora{}", hours, plural(hours, "s"))
    } else {
        let days = minutes / 1440;
        format!("Hace {} día{}", days, plural(days, "s"))
    }
}

fn plural(n: i64, suffix: &str) -> &str {
    if n == 1 {
        ""
    } else {
        suffix
    }
}

/// Per-message timestamp: today shows the time, yesterday is prefixed,
/// anything older carries the date.
pub fn message_time(ts: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = ts.with_timezone(&offset);
    let hm = format!("{:02}:{:02}", local.hour(), local.minute());
    let days = now.signed_duration_since(ts).num_days();

    if days == 0 {
        hm
    } else if days == 1 {
        format!("Ayer {hm}")
    } else {
        format!(
            "{} {} {hm}",
            local.day(),
            MONTHS_SHORT[local.month0() as usize]
        )
    }
}

/// Date-separator label, e.g. `lunes, 3 de febrero`.
pub fn date_separator(date: NaiveDate) -> String {
    format!(
        "{}, {} de {}",
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS[date.month0() as usize]
    )
}

/// `M:SS` rendering of recording and playback durations.
pub fn clip_time(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
