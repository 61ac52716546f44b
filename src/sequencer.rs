use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{StationConfig, WxFormat};
use crate::packet::{Frame, tocall};
use crate::uplink::FrameSender;
use crate::weather::{KNOWN_METRICS, WeatherReading};

/// Pause between the frames of a multi-step transmission.
pub const STEP_DELAY: Duration = Duration::from_secs(15);

/// Transmission mode for one sequencer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Test,
    WxText,
    Wx,
    PlainText,
}

/// Completion status of one run. Failures never propagate as errors;
/// the daemon only logs this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Every planned frame was sent.
    Complete,
    /// At least one frame was sent before a step failed.
    Partial,
    /// Nothing left the station.
    NotSent,
}

/// Pick the mode from the test flag and configuration. Weather modes
/// require a non-empty reading; otherwise plain text is the fallback.
pub fn select_mode(config: &StationConfig, reading: &WeatherReading, is_test: bool) -> TxMode {
    if is_test {
        return TxMode::Test;
    }
    if config.send_weather && !reading.is_empty() {
        match config.wx_format {
            WxFormat::WxText => return TxMode::WxText,
            WxFormat::Wx => return TxMode::Wx,
            WxFormat::Text => {}
        }
    }
    TxMode::PlainText
}

/// Drives one transmission through the frame sender. Timestamps and the
/// encoded position are re-sampled before every frame of a multi-step
/// sequence, since real time passes between steps.
pub struct Sequencer<'a> {
    sender: &'a dyn FrameSender,
    step_delay: Duration,
}

impl<'a> Sequencer<'a> {
    pub fn new(sender: &'a dyn FrameSender) -> Self {
        Self {
            sender,
            step_delay: STEP_DELAY,
        }
    }

    pub fn with_step_delay(sender: &'a dyn FrameSender, step_delay: Duration) -> Self {
        Self { sender, step_delay }
    }

    pub async fn run(
        &self,
        config: &StationConfig,
        reading: &WeatherReading,
        is_test: bool,
    ) -> TxOutcome {
        let mode = select_mode(config, reading, is_test);
        debug!("transmission mode: {:?}", mode);
        match mode {
            TxMode::Test => self.run_test(config).await,
            TxMode::WxText => self.run_wx_text(config, reading).await,
            TxMode::Wx => self.run_wx(config, reading).await,
            TxMode::PlainText => self.run_plain_text(config, reading).await,
        }
    }

    async fn run_test(&self, config: &StationConfig) -> TxOutcome {
        let dest = tocall(true);
        info!("TEST mode active (TOCALL: {})", dest);
        let message = if config.comment_prefix.is_empty() {
            config.test_message.clone()
        } else {
            format!("{} {}", config.comment_prefix, config.test_message)
        };
        let frame = Frame::status(config, Utc::now(), dest, message);
        if self.sender.send_frame(config, &frame).await {
            TxOutcome::Complete
        } else {
            TxOutcome::NotSent
        }
    }

    async fn run_wx_text(&self, config: &StationConfig, reading: &WeatherReading) -> TxOutcome {
        let dest = tocall(false);
        info!("WX-TEXT mode active (TOCALL: {})", dest);

        let comment_frame = Frame::status(config, Utc::now(), dest, config.comment_wx.clone());
        if !self.sender.send_frame(config, &comment_frame).await {
            return TxOutcome::NotSent;
        }

        info!("comment sent, waiting {}s", self.step_delay.as_secs());
        tokio::time::sleep(self.step_delay).await;

        let wx_frame = Frame::weather(config, Utc::now(), dest, reading);
        if !self.sender.send_frame(config, &wx_frame).await {
            return TxOutcome::Partial;
        }
        if !config.restore_icon {
            return TxOutcome::Complete;
        }

        info!("WX data sent, restoring icon in {}s", self.step_delay.as_secs());
        tokio::time::sleep(self.step_delay).await;

        let restore_frame = Frame::icon_restore(config, Utc::now(), dest);
        if self.sender.send_frame(config, &restore_frame).await {
            TxOutcome::Complete
        } else {
            TxOutcome::Partial
        }
    }

    async fn run_wx(&self, config: &StationConfig, reading: &WeatherReading) -> TxOutcome {
        let dest = tocall(false);
        info!("WX station mode active (TOCALL: {})", dest);
        let frame = Frame::weather(config, Utc::now(), dest, reading);
        if self.sender.send_frame(config, &frame).await {
            TxOutcome::Complete
        } else {
            TxOutcome::NotSent
        }
    }

    async fn run_plain_text(&self, config: &StationConfig, reading: &WeatherReading) -> TxOutcome {
        let dest = tocall(false);
        let frame = Frame::status(config, Utc::now(), dest, plain_text_body(config, reading));
        if self.sender.send_frame(config, &frame).await {
            TxOutcome::Complete
        } else {
            TxOutcome::NotSent
        }
    }
}

/// Human-readable weather line: known metrics in fixed order, then any
/// remaining numeric metrics labelled by capitalized key. Falls back to
/// the static comment when no metric is available.
pub fn plain_text_body(config: &StationConfig, reading: &WeatherReading) -> String {
    let mut parts: Vec<String> = Vec::new();
    if config.send_weather {
        if let Some(v) = reading.get("temperature") {
            parts.push(format!("Temp: {v:.1}C"));
        }
        if let Some(v) = reading.get("dewpoint") {
            parts.push(format!("DewPt: {v:.1}C"));
        }
        if let Some(v) = reading.get("humidity") {
            parts.push(format!("Hum: {}%", v.round() as i64));
        }
        if let Some(v) = reading.get("pressure") {
            parts.push(format!("Press: {v:.1}hPa"));
        }
        if let Some(v) = reading.get("wind_speed") {
            parts.push(format!("WindSpd: {v:.1}m/s"));
        }
        if let Some(v) = reading.get("wind_direction") {
            parts.push(format!("WindDir: {v:.0}"));
        }
        if let Some(v) = reading.get("wind_gust") {
            parts.push(format!("WindGust: {v:.1}m/s"));
        }
        if let Some(v) = reading.get("rain_1h") {
            parts.push(format!("Rain1h: {v:.1}mm"));
        }
        if let Some(v) = reading.get("rain_24h") {
            parts.push(format!("Rain24h: {v:.1}mm"));
        }
        for (key, value) in reading {
            if !KNOWN_METRICS.contains(&key.as_str()) {
                parts.push(format!("{}: {:.1}", title_case(key), value));
            }
        }
    }
    let body = if parts.is_empty() {
        config.comment.clone()
    } else {
        parts.join(" ")
    };
    if config.comment_prefix.is_empty() {
        body
    } else {
        format!("{} {}", config.comment_prefix, body)
    }
}

/// Capitalize the first letter of each word (word boundaries at any
/// non-alphabetic character), lowercasing the rest.
fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut at_word_start = true;
    for c in key.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Records rendered frames and replays scripted send results
    /// (defaulting to success once the script runs out).
    struct MockSender {
        sent: Mutex<Vec<String>>,
        results: Mutex<VecDeque<bool>>,
    }

    impl MockSender {
        fn new(results: &[bool]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                results: Mutex::new(results.iter().copied().collect()),
            }
        }

        async fn sent(&self) -> Vec<String> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl FrameSender for MockSender {
        async fn send_frame(&self, _config: &StationConfig, frame: &Frame) -> bool {
            self.sent.lock().await.push(frame.render());
            self.results.lock().await.pop_front().unwrap_or(true)
        }
    }

    fn config(wx_format: WxFormat, restore_icon: bool) -> StationConfig {
        StationConfig {
            callsign: "TEST".to_string(),
            ssid: "7".to_string(),
            passcode: "12345".to_string(),
            server: "127.0.0.1".to_string(),
            port: 14580,
            comment_prefix: String::new(),
            comment: "73 de TEST".to_string(),
            comment_wx: "Weather Station".to_string(),
            test_message: "TEST".to_string(),
            send_weather: true,
            wx_format,
            restore_icon,
            symbol_table: "/".to_string(),
            symbol_code: "<".to_string(),
            lat: 45.0,
            lon: 9.0,
        }
    }

    fn reading() -> WeatherReading {
        let mut r = WeatherReading::new();
        r.insert("temperature".to_string(), 21.0);
        r.insert("humidity".to_string(), 60.0);
        r
    }

    #[test]
    fn mode_selection() {
        let reading = reading();
        let empty = WeatherReading::new();
        assert_eq!(
            select_mode(&config(WxFormat::Wx, false), &reading, true),
            TxMode::Test
        );
        assert_eq!(
            select_mode(&config(WxFormat::WxText, false), &reading, false),
            TxMode::WxText
        );
        assert_eq!(
            select_mode(&config(WxFormat::Wx, false), &reading, false),
            TxMode::Wx
        );
        assert_eq!(
            select_mode(&config(WxFormat::Text, false), &reading, false),
            TxMode::PlainText
        );
        // No data forces the plain-text fallback regardless of format.
        assert_eq!(
            select_mode(&config(WxFormat::Wx, false), &empty, false),
            TxMode::PlainText
        );
        let mut off = config(WxFormat::Wx, false);
        off.send_weather = false;
        assert_eq!(select_mode(&off, &reading, false), TxMode::PlainText);
    }

    #[tokio::test(start_paused = true)]
    async fn wx_text_sends_three_frames_when_all_succeed() {
        let sender = MockSender::new(&[true, true, true]);
        let cfg = config(WxFormat::WxText, true);
        let outcome = Sequencer::new(&sender).run(&cfg, &reading(), false).await;
        assert_eq!(outcome, TxOutcome::Complete);
        let sent = sender.sent().await;
        assert_eq!(sent.len(), 3);
        assert!(sent[0].ends_with("< Weather Station"));
        assert!(sent[1].contains("E_c000s000g000t069r000p000P000h60"));
        assert!(sent[2].ends_with("00900.00E<"));
    }

    #[tokio::test(start_paused = true)]
    async fn wx_text_aborts_after_first_failure() {
        let sender = MockSender::new(&[false]);
        let cfg = config(WxFormat::WxText, true);
        let outcome = Sequencer::new(&sender).run(&cfg, &reading(), false).await;
        assert_eq!(outcome, TxOutcome::NotSent);
        assert_eq!(sender.sent().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wx_text_partial_when_weather_frame_fails() {
        let sender = MockSender::new(&[true, false]);
        let cfg = config(WxFormat::WxText, true);
        let outcome = Sequencer::new(&sender).run(&cfg, &reading(), false).await;
        assert_eq!(outcome, TxOutcome::Partial);
        assert_eq!(sender.sent().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wx_text_skips_icon_restore_when_disabled() {
        let sender = MockSender::new(&[true, true]);
        let cfg = config(WxFormat::WxText, false);
        let outcome = Sequencer::new(&sender).run(&cfg, &reading(), false).await;
        assert_eq!(outcome, TxOutcome::Complete);
        assert_eq!(sender.sent().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wx_mode_sends_single_weather_frame() {
        let sender = MockSender::new(&[true]);
        let cfg = config(WxFormat::Wx, false);
        let outcome = Sequencer::new(&sender).run(&cfg, &reading(), false).await;
        assert_eq!(outcome, TxOutcome::Complete);
        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(">APWXGT,TCPIP*:"));
        assert!(sent[0].contains("/00900.00E_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_prefixes_comment_prefix() {
        let sender = MockSender::new(&[true]);
        let mut cfg = config(WxFormat::Text, false);
        cfg.comment_prefix = "[beta]".to_string();
        let outcome = Sequencer::new(&sender)
            .run(&cfg, &WeatherReading::new(), true)
            .await;
        assert_eq!(outcome, TxOutcome::Complete);
        let sent = sender.sent().await;
        assert!(sent[0].contains(">APRS,TCPIP*:"));
        assert!(sent[0].ends_with("< [beta] TEST"));
    }

    #[test]
    fn plain_text_known_metric_order_and_unknown_labels() {
        let cfg = config(WxFormat::Text, false);
        let mut r = reading();
        r.insert("wind_speed".to_string(), 3.2);
        r.insert("uv_index".to_string(), 4.0);
        assert_eq!(
            plain_text_body(&cfg, &r),
            "Temp: 21.0C Hum: 60% WindSpd: 3.2m/s Uv_Index: 4.0"
        );
    }

    #[test]
    fn plain_text_falls_back_to_comment() {
        let cfg = config(WxFormat::Text, false);
        assert_eq!(plain_text_body(&cfg, &WeatherReading::new()), "73 de TEST");

        let mut off = cfg.clone();
        off.send_weather = false;
        assert_eq!(plain_text_body(&off, &reading()), "73 de TEST");
    }
}
