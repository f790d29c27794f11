//! Time-tagged lyric parser
//!
//! Lines carry one or more `[mm:ss]` or `[mm:ss.xx]` / `[mm:ss.xxx]` tags,
//! anywhere in the line:
//! [00:12.34]Hello world
//! [00:15.00][01:02.50]Chorus line

/// A single lyric line pinned to a playback offset.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricCue {
    /// Offset from the start of the track, in seconds
    pub time: f64,
    pub text: String,
}

impl LyricCue {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// Parse raw lyric text into cues sorted by time.
///
/// Lines without a recognised tag, and lines whose text is empty once the
/// tags are stripped, produce nothing. Never fails: garbage in, no cues out.
pub fn parse(raw: &str) -> Vec<LyricCue> {
    let mut cues = Vec::new();

    for line in raw.lines() {
        let (times, text) = split_tags(line);
        if times.is_empty() || text.is_empty() {
            continue;
        }
        cues.extend(times.into_iter().map(|t| LyricCue::new(t, text.clone())));
    }

    cues.sort_by(|a, b| a.time.total_cmp(&b.time));
    cues
}

/// Index of the last cue whose time is `<= current_time`.
pub fn active_index(cues: &[LyricCue], current_time: f64) -> Option<usize> {
    cues.partition_point(|c| c.time <= current_time).checked_sub(1)
}

/// Pull every timestamp tag out of `line`, returning the times and the
/// remaining text (trimmed).
fn split_tags(line: &str) -> (Vec<f64>, String) {
    let mut times = Vec::new();
    let mut text = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('[') {
        text.push_str(&rest[..open]);
        let candidate = &rest[open..];
        match match_tag(candidate) {
            Some((secs, len)) => {
                times.push(secs);
                rest = &candidate[len..];
            }
            None => {
                text.push('[');
                rest = &candidate[1..];
            }
        }
    }
    text.push_str(rest);

    (times, text.trim().to_string())
}

/// Match a tag at the very start of `s`. Returns the offset in seconds and
/// the tag's byte length.
fn match_tag(s: &str) -> Option<(f64, usize)> {
    let b = s.as_bytes();
    let digits = |range: std::ops::Range<usize>| -> Option<u64> {
        let part = b.get(range)?;
        if part.iter().all(u8::is_ascii_digit) {
            std::str::from_utf8(part).ok()?.parse().ok()
        } else {
            None
        }
    };

    if b.first() != Some(&b'[') || b.get(3) != Some(&b':') {
        return None;
    }
    let min = digits(1..3)?;
    let sec = digits(4..6)?;

    let (millis, len) = match b.get(6)? {
        b']' => (0, 7),
        b'.' => {
            let frac_len = b[7..].iter().take_while(|c| c.is_ascii_digit()).count();
            if !(2..=3).contains(&frac_len) || b.get(7 + frac_len) != Some(&b']') {
                return None;
            }
            let frac = digits(7..7 + frac_len)?;
            // Right-pad to milliseconds: "5" never reaches here, "50" -> 500.
            let millis = if frac_len == 2 { frac * 10 } else { frac };
            (millis, 7 + frac_len + 1)
        }
        _ => return None,
    };

    let total_ms = min * 60_000 + sec * 1000 + millis;
    Some((total_ms as f64 / 1000.0, len))
}
