// THEORY:
// The `CommandEngine` serves at most one command per scheduling tick.
//
// Algorithm steps:
// 1.  **Gate**: a disabled session means no serial I/O at all. The caller keeps
//     polling frames regardless.
// 2.  **Read**: take whatever bytes are pending and wait a short grace period. Only
//     when a command is still open (a `[` without its `]`) is the port read again
//     for its tail.
// 3.  **Decode**: the first framed command is taken out of the carry-over buffer
//     (see `command::CommandBuffer`). Anything after it waits for the next tick.
// 4.  **Dispatch**: run the detection the command asks for on the current frame.
//     A missing frame never reaches the detector; it answers the "nothing found"
//     reply directly.
// 5.  **Reply**: write the bracketed reply. Nothing found is the zero-vector.
//
// A read or write failure is logged and disables the session for good.

use crate::config::{ProtocolConfig, ReplyShape, Settings};
use crate::core_modules::blob::Candidate;
use crate::core_modules::estimator::DEFAULT_MAX_REPORT_ANGLE_DEG;
use crate::core_modules::target_detector::{BLACK, TargetDetector, YELLOW, judge_catch};
use crate::error::Result;
use crate::protocol::command::{Command, CommandBuffer, Reply};
use crate::protocol::serial::SerialSession;
use image::RgbImage;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct CommandEngine {
    detector: TargetDetector,
    session: SerialSession,
    protocol: ProtocolConfig,
    grace: Duration,
    inbound: CommandBuffer,
    served: BTreeMap<Command, u64>,
    last_reply: Option<Reply>,
}

impl CommandEngine {
    pub fn new(settings: &Settings, session: SerialSession) -> Self {
        let mut protocol = settings.protocol.clone();
        if !(protocol.max_report_angle_deg >= 0.0) {
            warn!(
                value = protocol.max_report_angle_deg,
                fallback = DEFAULT_MAX_REPORT_ANGLE_DEG,
                "invalid max_report_angle_deg"
            );
            protocol.max_report_angle_deg = DEFAULT_MAX_REPORT_ANGLE_DEG;
        }

        Self {
            detector: TargetDetector::from_settings(settings),
            session,
            protocol,
            grace: Duration::from_millis(settings.serial.grace_ms),
            inbound: CommandBuffer::new(),
            served: BTreeMap::new(),
            last_reply: None,
        }
    }

    pub fn session(&self) -> &SerialSession {
        &self.session
    }

    pub fn detector(&self) -> &TargetDetector {
        &self.detector
    }

    /// Commands served so far, by kind.
    pub fn served(&self) -> &BTreeMap<Command, u64> {
        &self.served
    }

    pub fn last_reply(&self) -> Option<&Reply> {
        self.last_reply.as_ref()
    }

    /// One protocol step. Returns the reply that was written, if any.
    pub async fn service(&mut self, frame: Option<&RgbImage>) -> Option<Reply> {
        if !self.session.is_enabled() {
            return None;
        }

        let next = match self.next_command().await {
            Ok(next) => next,
            Err(e) => {
                self.session.disable(&e);
                return None;
            }
        };

        let reply = match next {
            None if !self.protocol.reply_when_idle => return None,
            None => Reply::zero(self.protocol.reply_shape.arity()),
            Some(command) => {
                let reply = self.respond(command, frame);
                info!(command = command.name(), %reply, "serving command");
                *self.served.entry(command).or_default() += 1;
                reply
            }
        };

        let written = match self.session.channel_mut() {
            Some(channel) => channel.write_reply(&reply.encode()),
            None => Ok(()),
        };
        if let Err(e) = written {
            self.session.disable(&e);
            return None;
        }
        self.last_reply = Some(reply.clone());
        Some(reply)
    }

    /// Reads the port into the carry-over buffer and takes one command out of it.
    async fn next_command(&mut self) -> Result<Option<Command>> {
        let grace = self.grace;
        let Some(channel) = self.session.channel_mut() else {
            return Ok(None);
        };
        self.inbound.push(&channel.read_pending()?);
        tokio::time::sleep(grace).await;
        if self.inbound.awaiting_close() {
            self.inbound.push(&channel.read_pending()?);
        }
        Ok(self.inbound.next_command())
    }

    /// The reply owed for `command` on `frame`.
    pub fn respond(&self, command: Command, frame: Option<&RgbImage>) -> Reply {
        let shape = self.protocol.reply_shape;
        let Some(frame) = frame else {
            debug!(command = command.name(), "no frame");
            return match command {
                Command::CheckBall => Reply::No,
                Command::FindPlace => Reply::zero(ReplyShape::AngleDistance.arity()),
                _ => Reply::zero(shape.arity()),
            };
        };

        let team = self.protocol.team_color.as_str();
        match command {
            Command::FindTeamColor => self.ball_reply(frame, &[team]),
            Command::FindBall => {
                let mut chain = vec![team];
                if self.protocol.prioritize_black {
                    chain.push(BLACK);
                }
                chain.push(YELLOW);
                self.ball_reply(frame, &chain)
            }
            Command::CheckBall => {
                let present = self.detector.sleeve_colors(frame, self.protocol.catch_pixel_threshold);
                let caught = judge_catch(&present, team);
                debug!(?present, caught, "sleeve check");
                Reply::caught(caught)
            }
            Command::FindPlace => self.place_reply(frame, team),
            Command::Unknown => Reply::zero(shape.arity()),
        }
    }

    fn ball_reply(&self, frame: &RgbImage, chain: &[&str]) -> Reply {
        let shape = self.protocol.reply_shape;
        match self.detector.nearest_in_priority(frame, chain) {
            Some((color, ball)) => {
                debug!(color, x = ball.center_x, y = ball.center_y, mm = ball.distance_mm, "nearest ball");
                Reply::Values(self.report(frame, &ball, shape))
            }
            None => Reply::zero(shape.arity()),
        }
    }

    fn report(&self, frame: &RgbImage, ball: &Candidate, shape: ReplyShape) -> Vec<i64> {
        let (width, height) = frame.dimensions();
        self.detector
            .estimator()
            .outcome(ball.center_x as f64, ball.center_y as f64, width, height, ball.distance_mm)
            .report(shape, self.protocol.max_report_angle_deg)
    }

    /// Always two-valued, whatever the configured reply shape.
    fn place_reply(&self, frame: &RgbImage, team: &str) -> Reply {
        let shape = ReplyShape::AngleDistance;
        let Some(zone) = self.detector.detect_safe_zone(frame, Some(team)) else {
            return Reply::zero(shape.arity());
        };
        let estimator = self.detector.estimator();
        let (cx, cy) = zone.rect.center();
        let (width, height) = frame.dimensions();
        let distance_mm = estimator.safe_zone_distance_mm(zone.rect.area());
        let values = estimator
            .outcome(cx as f64, cy as f64, width, height, distance_mm)
            .report(shape, self.protocol.max_report_angle_deg);
        Reply::Values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::serial::scripted::ScriptedChannel;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const FLOOR: Rgb<u8> = Rgb([128, 128, 128]);

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.serial.grace_ms = 0;
        settings
    }

    fn engine_with(settings: &Settings) -> (CommandEngine, ScriptedChannel) {
        let channel = ScriptedChannel::new();
        let session = SerialSession::with_channel(Box::new(channel.clone()));
        (CommandEngine::new(settings, session), channel)
    }

    fn floor() -> RgbImage {
        RgbImage::from_pixel(640, 480, FLOOR)
    }

    fn values(reply: Option<Reply>) -> Vec<i64> {
        match reply {
            Some(Reply::Values(values)) => values,
            other => panic!("expected values, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_ball_ranges_a_red_disc() {
        let (mut engine, channel) = engine_with(&settings());
        let mut frame = floor();
        draw_filled_circle_mut(&mut frame, (370, 240), 20, Rgb([220, 20, 20]));

        channel.push("[FindBall]\n");
        let values = values(engine.service(Some(&frame)).await);
        // 50 px right of center at 60/640 deg per px; 15000 / ~41 px.
        assert_eq!(values[0], 4);
        assert!((35..=37).contains(&values[1]), "{values:?}");
        assert_eq!(channel.written(), vec![format!("[4,{}]", values[1])]);
        assert_eq!(engine.served()[&Command::FindBall], 1);
    }

    #[tokio::test]
    async fn idle_tick_without_frame_answers_zero() {
        let (mut engine, channel) = engine_with(&settings());
        assert_eq!(engine.service(None).await, Some(Reply::zero(2)));
        assert_eq!(channel.written(), vec!["[0,0]".to_string()]);
        assert!(engine.served().is_empty());
    }

    #[tokio::test]
    async fn idle_tick_can_stay_silent() {
        let mut settings = settings();
        settings.protocol.reply_when_idle = false;
        let (mut engine, channel) = engine_with(&settings);
        assert_eq!(engine.service(None).await, None);
        assert!(channel.written().is_empty());
    }

    #[tokio::test]
    async fn unknown_data_and_null_frame_answer_zero_vectors() {
        let mut settings = settings();
        settings.protocol.reply_shape = ReplyShape::AngleElevationDistance;
        let (mut engine, channel) = engine_with(&settings);

        channel.push("garbage");
        channel.push("[FindTeamColor]");
        channel.push("[FindPlace]");
        channel.push("[CheakBall]");
        for _ in 0..4 {
            engine.service(None).await;
        }
        assert_eq!(channel.written(), vec!["[0,0,0]", "[0,0,0]", "[0,0]", "[NO]"]);
    }

    #[tokio::test]
    async fn find_ball_falls_back_to_black_then_yellow() {
        let mut frame = floor();
        draw_filled_circle_mut(&mut frame, (100, 240), 20, Rgb([10, 10, 10]));
        draw_filled_circle_mut(&mut frame, (540, 240), 20, Rgb([210, 180, 30]));

        let (mut engine, channel) = engine_with(&settings());
        channel.push("[FindBall]");
        channel.push("[FindTeamColor]");
        // -220 px and +220 px from center.
        assert_eq!(values(engine.service(Some(&frame)).await)[0], -20);
        assert_eq!(values(engine.service(Some(&frame)).await), vec![0, 0]);

        let mut settings = settings();
        settings.protocol.prioritize_black = false;
        let (mut engine, channel) = engine_with(&settings);
        channel.push("[FindBall]");
        assert_eq!(values(engine.service(Some(&frame)).await)[0], 20);
    }

    #[tokio::test]
    async fn elevation_shape_reports_three_values() {
        let mut settings = settings();
        settings.protocol.reply_shape = ReplyShape::AngleElevationDistance;
        let (mut engine, channel) = engine_with(&settings);
        let mut frame = floor();
        draw_filled_circle_mut(&mut frame, (320, 140), 20, Rgb([220, 20, 20]));

        channel.push("[FindTeamColor]");
        let values = values(engine.service(Some(&frame)).await);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], 0);
        // 100 px above center at 45/480 deg per px.
        assert_eq!(values[1], 9);
    }

    #[tokio::test]
    async fn check_ball_judges_the_sleeve() {
        let (mut engine, channel) = engine_with(&settings());
        let mut frame = floor();
        draw_filled_rect_mut(&mut frame, Rect::at(213, 160).of_size(213, 40), Rgb([245, 245, 245]));
        draw_filled_circle_mut(&mut frame, (320, 250), 25, Rgb([220, 20, 20]));

        channel.push("[CheakBall]");
        channel.push("[CheakBall]");
        assert_eq!(engine.service(Some(&frame)).await, Some(Reply::Ok));
        assert_eq!(engine.service(Some(&floor())).await, Some(Reply::No));
        assert_eq!(channel.written(), vec!["[OK]", "[NO]"]);
    }

    #[tokio::test]
    async fn find_place_ranges_the_team_zone() {
        let mut settings = settings();
        settings.protocol.team_color = "blue".to_string();
        settings.protocol.reply_shape = ReplyShape::AngleElevationDistance;
        let (mut engine, channel) = engine_with(&settings);
        let mut frame = floor();
        draw_filled_rect_mut(&mut frame, Rect::at(150, 300).of_size(240, 80), Rgb([20, 40, 220]));

        channel.push("[FindPlace]");
        let values = values(engine.service(Some(&frame)).await);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], -4);
        // 32214 / ~19200 px^2 * 520 mm.
        assert!((85..=89).contains(&values[1]), "{values:?}");
    }

    #[tokio::test]
    async fn find_place_ranges_by_the_bounding_box() {
        let mut settings = settings();
        settings.protocol.team_color = "blue".to_string();
        let (mut engine, channel) = engine_with(&settings);
        let mut frame = floor();
        draw_filled_rect_mut(&mut frame, Rect::at(150, 300).of_size(240, 80), Rgb([20, 40, 220]));

        let zone = engine.detector().detect_safe_zone(&frame, Some("blue")).expect("zone");
        let box_area = (zone.rect.width * zone.rect.height) as f64;
        assert!(box_area > zone.contour_area, "{box_area} vs {}", zone.contour_area);
        let expected_cm = (32214.0 / box_area * 520.0 / 10.0).trunc() as i64;

        channel.push("[FindPlace]");
        assert_eq!(values(engine.service(Some(&frame)).await)[1], expected_cm);
    }

    #[tokio::test]
    async fn back_to_back_commands_get_one_reply_each_in_order() {
        let (mut engine, channel) = engine_with(&settings());
        channel.push("[FindPlace][CheakBall]");
        assert_eq!(engine.service(None).await, Some(Reply::zero(2)));
        assert_eq!(engine.service(None).await, Some(Reply::No));
        // Drained: the next tick is idle.
        assert_eq!(engine.service(None).await, Some(Reply::zero(2)));
        assert_eq!(channel.written(), vec!["[0,0]", "[NO]", "[0,0]"]);
        assert_eq!(engine.served()[&Command::FindPlace], 1);
        assert_eq!(engine.served()[&Command::CheckBall], 1);
    }

    #[tokio::test]
    async fn commands_arriving_close_together_are_served_one_per_tick() {
        let mut settings = settings();
        settings.protocol.reply_when_idle = false;
        let (mut engine, channel) = engine_with(&settings);

        // The tail of the first command lands during the grace period,
        // together with the whole of the second.
        channel.push("[Find");
        channel.push("Ball]\r\n[CheakBall]\r\n");
        assert_eq!(engine.service(None).await, Some(Reply::zero(2)));
        assert_eq!(channel.written(), vec!["[0,0]"]);

        assert_eq!(engine.service(None).await, Some(Reply::No));
        assert_eq!(engine.service(None).await, None);
        assert_eq!(channel.written(), vec!["[0,0]", "[NO]"]);
        assert_eq!(engine.served()[&Command::FindBall], 1);
        assert_eq!(engine.served()[&Command::CheckBall], 1);
    }

    #[tokio::test]
    async fn negative_angle_limit_does_not_break_replies() {
        let mut settings = settings();
        settings.protocol.max_report_angle_deg = -90.0;
        let (mut engine, channel) = engine_with(&settings);
        let mut frame = floor();
        draw_filled_circle_mut(&mut frame, (370, 240), 20, Rgb([220, 20, 20]));

        channel.push("[FindBall]");
        let reply = values(engine.service(Some(&frame)).await);
        assert_eq!(reply[0], 4);
        assert!((35..=37).contains(&reply[1]), "{reply:?}");

        settings.protocol.max_report_angle_deg = f64::NAN;
        let (mut engine, channel) = engine_with(&settings);
        channel.push("[FindBall]");
        assert_eq!(values(engine.service(Some(&frame)).await)[0], 4);
    }

    #[tokio::test]
    async fn write_failure_silences_the_protocol_for_good() {
        let (mut engine, channel) = engine_with(&settings());
        channel.fail_next_write();
        channel.push("[FindBall]");

        assert_eq!(engine.service(None).await, None);
        assert!(!engine.session().is_enabled());
        let reads = channel.reads();

        channel.push("[FindBall]");
        for _ in 0..3 {
            assert_eq!(engine.service(None).await, None);
        }
        assert_eq!(channel.reads(), reads);
        assert!(channel.written().is_empty());
    }

    #[tokio::test]
    async fn read_failure_disables_the_session() {
        let (mut engine, channel) = engine_with(&settings());
        channel.fail_next_read();
        assert_eq!(engine.service(None).await, None);
        assert!(!engine.session().is_enabled());
        assert!(channel.written().is_empty());
    }
}
