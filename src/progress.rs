//! Live scan progress display
//!
//! A fixed-height status block: progress bar, throughput, elapsed time,
//! ETA, and the eight category counters. Redraws are throttled so the
//! display never becomes the bottleneck of a fast scan; each redraw moves
//! the cursor up over the previous block and clears to the end of the
//! screen, which survives long lines where carriage-return overwriting
//! would leave wrap artifacts.

use crate::taxonomy::{Category, LatencyTaxonomy};
use std::io::{self, Write};
use std::time::{Duration, Instant};

const BAR_WIDTH: usize = 25;
/// Status line plus one line per category.
const BLOCK_HEIGHT: usize = 1 + Category::ALL.len();

/// Throttled renderer for the live status block
pub struct ProgressReporter {
    planned: u64,
    block_size: u64,
    enabled: bool,
    started: Instant,
    last_redraw: Option<Instant>,
    last_percent: f64,
    drawn_once: bool,
}

impl ProgressReporter {
    /// Reporter for a scan of `planned` samples of `block_size` bytes.
    pub fn new(planned: u64, block_size: u64, enabled: bool) -> Self {
        ProgressReporter {
            planned,
            block_size,
            enabled,
            started: Instant::now(),
            last_redraw: None,
            last_percent: 0.0,
            drawn_once: false,
        }
    }

    /// Feed one completed sample; redraws when the policy says so.
    pub fn update(
        &mut self,
        scanned: u64,
        sector: u64,
        category: Category,
        taxonomy: &LatencyTaxonomy,
    ) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let percent = self.percent(scanned);
        let since_last = self.last_redraw.map(|at| now.duration_since(at));
        let decision = should_redraw(
            since_last,
            percent - self.last_percent,
            category,
            scanned <= 1,
            scanned >= self.planned,
        );
        if !decision {
            return;
        }

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let _ = self.render(&mut out, scanned, sector, taxonomy);
        let _ = out.flush();

        self.last_redraw = Some(now);
        self.last_percent = percent;
    }

    /// Leave the finished block behind and move to a fresh line.
    pub fn finish(&mut self) {
        if self.enabled && self.drawn_once {
            println!();
        }
    }

    fn percent(&self, scanned: u64) -> f64 {
        if self.planned == 0 {
            100.0
        } else {
            scanned as f64 / self.planned as f64 * 100.0
        }
    }

    /// Render the status block, replacing the previously drawn one.
    pub fn render(
        &mut self,
        out: &mut impl Write,
        scanned: u64,
        sector: u64,
        taxonomy: &LatencyTaxonomy,
    ) -> io::Result<()> {
        if self.drawn_once {
            // Cursor up over the old block, then wipe everything below.
            write!(out, "\x1b[{}A\x1b[0J", BLOCK_HEIGHT)?;
        }

        let percent = self.percent(scanned);
        let elapsed = self.started.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            scanned as f64 / elapsed_secs
        } else {
            0.0
        };
        let throughput = rate * self.block_size as f64;
        let eta = if rate > 0.0 && scanned < self.planned {
            Some(Duration::from_secs_f64((self.planned - scanned) as f64 / rate))
        } else {
            None
        };

        let filled = (percent / 100.0 * BAR_WIDTH as f64) as usize;
        let bar: String = (0..BAR_WIDTH)
            .map(|i| if i < filled { '█' } else { '░' })
            .collect();

        write!(
            out,
            "[{}] {:6.2}%  sector {}  {}  elapsed {}",
            bar,
            percent,
            sector,
            format_rate(throughput),
            format_duration(elapsed.as_secs()),
        )?;
        match eta {
            Some(eta) => writeln!(out, "  eta {}", format_duration(eta.as_secs()))?,
            None => writeln!(out)?,
        }

        for category in Category::ALL {
            writeln!(
                out,
                "  {:<10} {:>10} ({:6.2}%)",
                category.name(),
                taxonomy.count(category),
                taxonomy.fraction(category) * 100.0
            )?;
        }

        self.drawn_once = true;
        Ok(())
    }
}

/// Redraw policy: at most once a second, except that bad news, whole
/// percent steps, and the first and final samples always show.
fn should_redraw(
    since_last: Option<Duration>,
    percent_advance: f64,
    category: Category,
    is_first: bool,
    is_final: bool,
) -> bool {
    if is_first || is_final {
        return true;
    }
    if category >= Category::Poor {
        return true;
    }
    if percent_advance >= 1.0 {
        return true;
    }
    match since_last {
        Some(elapsed) => elapsed >= Duration::from_secs(1),
        None => true,
    }
}

/// Humanize a byte rate.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// Compact `h`/`m`/`s` rendering of a duration in seconds.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h{:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;

    #[test]
    fn test_policy_first_and_final_always_draw() {
        assert!(should_redraw(None, 0.0, Category::Excellent, true, false));
        assert!(should_redraw(
            Some(Duration::from_millis(1)),
            0.0,
            Category::Excellent,
            false,
            true
        ));
    }

    #[test]
    fn test_policy_bad_category_draws() {
        let recent = Some(Duration::from_millis(10));
        assert!(should_redraw(recent, 0.0, Category::Poor, false, false));
        assert!(should_redraw(recent, 0.0, Category::Damaged, false, false));
        assert!(!should_redraw(recent, 0.0, Category::General, false, false));
    }

    #[test]
    fn test_policy_time_and_percent() {
        assert!(should_redraw(
            Some(Duration::from_secs(2)),
            0.0,
            Category::Excellent,
            false,
            false
        ));
        assert!(should_redraw(
            Some(Duration::from_millis(10)),
            1.5,
            Category::Excellent,
            false,
            false
        ));
        assert!(!should_redraw(
            Some(Duration::from_millis(10)),
            0.5,
            Category::Excellent,
            false,
            false
        ));
    }

    #[test]
    fn test_render_block_height() {
        let mut reporter = ProgressReporter::new(100, 4096, true);
        let taxonomy = LatencyTaxonomy::for_class(DeviceClass::Hdd);
        let mut buf = Vec::new();
        reporter.render(&mut buf, 50, 1234, &taxonomy).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), BLOCK_HEIGHT);
        assert!(text.contains("50.00%"));
        assert!(text.contains("sector 1234"));
        assert!(text.contains("Excellent"));
        assert!(text.contains("Damaged"));

        // The second render rewinds over the first block.
        let mut buf = Vec::new();
        reporter.render(&mut buf, 60, 2000, &taxonomy).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("\x1b[9A\x1b[0J"));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(500.0), "500 B/s");
        assert_eq!(format_rate(2048.0), "2.0 KB/s");
        assert_eq!(format_rate(5.0 * 1024.0 * 1024.0), "5.0 MB/s");
        assert_eq!(format_rate(3.5 * 1024.0 * 1024.0 * 1024.0), "3.5 GB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(185), "3m05s");
        assert_eq!(format_duration(3720), "1h02m");
    }
}
