//! Per-frame interpolation driver.
//!
//! Owns the point queue, the output sink and the script registry on the render
//! thread. Each `run_frame`:
//! 1. applies queued script commands and drains new samples into the queue,
//! 2. fixes the active script for the frame,
//! 3. runs `onframe` once if the script defines it,
//! 4. calls `main` once per pulled pair until fewer than two samples remain.
//!
//! A script failure is contained to the frame: points pushed by the failing
//! call are rolled back, the frame's remaining pairs are consumed without
//! output, and the last sample stays behind as the next frame's anchor.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::commands::{SampleSender, ScriptClient, ScriptCommand};
use crate::config::InterpolatorConfig;
use crate::error::{CompileError, HandleError, RuntimeError};
use crate::output_sink::OutputSink;
use crate::point::ShaderPaintPoint;
use crate::point_queue::{PointQueue, Pull};
use crate::point_rhai::FrameSink;
use crate::script_diagnostics::ScriptDiagnostic;
use crate::script_log::reset_frame_log_count;
use crate::script_registry::{ScriptHandle, ScriptRegistry};
use crate::stroke::{SampleEvent, StrokeTracker};

/// Summary of one `run_frame`.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// 1-based frame number.
    pub frame: u64,
    /// Script that ran, `None` for the default script.
    pub script: Option<ScriptHandle>,
    pub onframe_called: bool,
    /// Pairs `main` completed successfully.
    pub pairs_processed: usize,
    /// Pairs consumed without output after a failure.
    pub pairs_skipped: usize,
    /// Points added to the sink this frame.
    pub points_emitted: usize,
    pub error: Option<RuntimeError>,
}

impl FrameReport {
    fn new(frame: u64) -> Self {
        Self {
            frame,
            script: None,
            onframe_called: false,
            pairs_processed: 0,
            pairs_skipped: 0,
            points_emitted: 0,
            error: None,
        }
    }
}

pub struct Interpolator {
    config: InterpolatorConfig,
    registry: ScriptRegistry,
    tracker: StrokeTracker,
    queue: Rc<RefCell<PointQueue>>,
    output: Rc<RefCell<OutputSink>>,
    /// Script-visible view of `queue` and `output`.
    sink: FrameSink,
    command_tx: Sender<ScriptCommand>,
    command_rx: Receiver<ScriptCommand>,
    sample_tx: SampleSender,
    sample_rx: Receiver<SampleEvent>,
    frame: u64,
}

impl Interpolator {
    pub fn new(config: InterpolatorConfig) -> Self {
        let queue = Rc::new(RefCell::new(PointQueue::new()));
        let output = Rc::new(RefCell::new(OutputSink::with_layers(config.layers)));
        let sink = FrameSink::new(output.clone(), queue.clone());
        let (command_tx, command_rx) = mpsc::channel();
        let (sample_tx, sample_rx) = mpsc::channel();

        Self {
            registry: ScriptRegistry::new(config.limits.clone()),
            tracker: StrokeTracker::new(config.size_window, config.speed_window),
            config,
            queue,
            output,
            sink,
            command_tx,
            command_rx,
            sample_tx,
            sample_rx,
            frame: 0,
        }
    }

    /// A handle for compiling and swapping scripts from other threads.
    pub fn client(&self) -> ScriptClient {
        ScriptClient::new(self.command_tx.clone())
    }

    /// Producer side of the sample channel, for the touch-capture thread.
    pub fn sample_sender(&self) -> SampleSender {
        self.sample_tx.clone()
    }

    // ========== Script management (render thread) ==========

    pub fn compile(&mut self, source: &str) -> Result<ScriptHandle, CompileError> {
        self.registry.compile(source)
    }

    /// Takes effect at the start of the next frame.
    pub fn activate(&mut self, handle: ScriptHandle) -> Result<(), HandleError> {
        self.registry.activate(handle)
    }

    pub fn unload(&mut self, handle: ScriptHandle) -> Result<(), HandleError> {
        self.registry.unload(handle)
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn take_diagnostics(&mut self) -> Vec<ScriptDiagnostic> {
        self.registry.take_diagnostics()
    }

    /// Apply every request sent through a [`ScriptClient`]. Returns how many
    /// were processed.
    pub fn drain_commands(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(command) = self.command_rx.try_recv() {
            // A send error only means the client stopped waiting for the reply.
            match command {
                ScriptCommand::Compile { source, reply } => {
                    let _ = reply.send(self.registry.compile(&source));
                }
                ScriptCommand::Activate { handle, reply } => {
                    let _ = reply.send(self.registry.activate(handle));
                }
                ScriptCommand::Unload { handle, reply } => {
                    let _ = reply.send(self.registry.unload(handle));
                }
            }
            processed += 1;
        }
        processed
    }

    // ========== Sample feed ==========

    /// Append an already derived sample to the queue.
    pub fn push_sample(&mut self, point: ShaderPaintPoint) {
        self.queue.borrow_mut().push(point);
    }

    /// Derive a sample from a raw touch event and queue it.
    pub fn push_event(&mut self, event: SampleEvent) {
        self.tracker.feed(event, &mut self.queue.borrow_mut());
    }

    /// Mark the end of a stroke for samples pushed with `push_sample`.
    pub fn end_stroke(&mut self) {
        self.queue.borrow_mut().end_stroke();
    }

    fn drain_samples(&mut self) -> usize {
        let mut queue = self.queue.borrow_mut();
        let mut count = 0;
        while let Ok(event) = self.sample_rx.try_recv() {
            self.tracker.feed(event, &mut queue);
            count += 1;
        }
        count
    }

    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// The sample the next pair will start from, if any.
    pub fn anchor(&self) -> Option<ShaderPaintPoint> {
        self.queue.borrow().anchor()
    }

    // ========== Output ==========

    pub fn output(&self) -> Ref<'_, OutputSink> {
        self.output.borrow()
    }

    /// Hand the accumulated points to the submission path, leaving the layers
    /// in place and empty.
    pub fn take_output(&mut self) -> Vec<Vec<ShaderPaintPoint>> {
        self.output.borrow_mut().take_layers()
    }

    pub fn add_layer(&mut self) -> usize {
        self.output.borrow_mut().add_layer()
    }

    /// Drop every layer except the base layer.
    pub fn clear_layers(&mut self) {
        self.output.borrow_mut().clear_layers();
    }

    // ========== Frame ==========

    pub fn run_frame(&mut self, width: u32, height: u32) -> FrameReport {
        self.frame += 1;
        let mut report = FrameReport::new(self.frame);

        reset_frame_log_count(self.config.max_logs_per_frame);
        self.drain_commands();
        let received = self.drain_samples();
        if received > 0 {
            log::trace!("frame {}: {} new samples", self.frame, received);
        }

        report.script = match self.registry.begin_frame() {
            Ok(script) => script,
            Err(e) => {
                log::error!("frame {}: no script available: {}", self.frame, e);
                return report;
            }
        };

        let (w, h) = (width as f32, height as f32);
        let points_before = self.output.borrow().total_points();

        let mark = self.output.borrow().mark();
        match self.registry.call_onframe(w, h, &self.sink) {
            Ok(called) => report.onframe_called = called,
            Err(e) => {
                self.output.borrow_mut().rollback(&mark);
                log::warn!("frame {}: onframe failed: {}", self.frame, e);
                report.onframe_called = true;
                report.error = Some(e);
                return report;
            }
        }

        loop {
            let pull = self.queue.borrow_mut().pull();
            let Pull::Pair(a, b) = pull else {
                break;
            };

            let mark = self.output.borrow().mark();
            match self.registry.call_main(a, b, w, h, &self.sink) {
                Ok(()) => report.pairs_processed += 1,
                Err(e) => {
                    self.output.borrow_mut().rollback(&mark);
                    report.pairs_skipped = 1 + self.queue.borrow_mut().skip_pairs();
                    log::warn!(
                        "frame {}: main failed after {} pairs, skipped {}: {}",
                        self.frame,
                        report.pairs_processed,
                        report.pairs_skipped,
                        e
                    );
                    report.error = Some(e);
                    break;
                }
            }
        }

        report.points_emitted = self.output.borrow().total_points() - points_before;
        report
    }

    /// Release every script and the engine.
    pub fn shutdown(&mut self) {
        self.drain_commands();
        self.registry.shutdown();
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(InterpolatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PaintPoint;

    fn sample(x: f32) -> ShaderPaintPoint {
        ShaderPaintPoint::new(x, 0.0, x, 1.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn test_default_script_runs_without_compile() {
        let mut interp = Interpolator::default();
        interp.push_sample(sample(0.0));
        interp.push_sample(sample(1.0));
        let report = interp.run_frame(100, 100);
        assert_eq!(report.script, None);
        assert_eq!(report.pairs_processed, 1);
        assert_eq!(report.points_emitted, 2);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_onframe_runs_before_pairs() {
        let mut interp = Interpolator::default();
        let h = interp
            .compile(
                "fn onframe(w, h, sink) { pushPoint(sink, 0, ShaderPaintPoint(w, h, 0.0, 0.0, 0.0, 0.0, 0.0)); }\n\
                 fn main(a, b, w, h, sink) { pushPoint(sink, 0, b); }",
            )
            .unwrap();
        interp.activate(h).unwrap();
        interp.push_sample(sample(1.0));
        interp.push_sample(sample(2.0));
        let report = interp.run_frame(640, 480);
        assert!(report.onframe_called);
        let layers = interp.take_output();
        assert_eq!(layers[0].len(), 2);
        assert_eq!(layers[0][0].pos.x, 640.0);
        assert_eq!(layers[0][0].pos.y, 480.0);
        assert_eq!(layers[0][1].pos.x, 2.0);
    }

    #[test]
    fn test_onframe_can_pull_pairs() {
        let mut interp = Interpolator::default();
        let h = interp
            .compile(
                "fn onframe(w, h, sink) {\n\
                     let buf = PointPairBuffer();\n\
                     while pullPointPair(sink, buf) == 2 { pushPoint(sink, 0, buf[1]); }\n\
                 }\n\
                 fn main(a, b, w, h, sink) { throw \"main should not run\"; }",
            )
            .unwrap();
        interp.activate(h).unwrap();
        for x in 0..4 {
            interp.push_sample(sample(x as f32));
        }
        let report = interp.run_frame(10, 10);
        assert!(report.error.is_none());
        assert_eq!(report.pairs_processed, 0);
        assert_eq!(report.points_emitted, 3);
        assert_eq!(interp.anchor().map(|p| p.pos.x), Some(3.0));
    }

    #[test]
    fn test_stroke_events_flow_through_channel() {
        let mut interp = Interpolator::default();
        let tx = interp.sample_sender();
        for i in 0..3 {
            let p = PaintPoint {
                pos: crate::point::Coordinate::new(i as f32, 0.0),
                time: i as f32,
                size: 2.0,
            };
            tx.send(SampleEvent::point(0, p)).unwrap();
        }
        tx.send(SampleEvent::Up { pointer: 0 }).unwrap();
        let report = interp.run_frame(10, 10);
        assert_eq!(report.pairs_processed, 2);
        // Stroke ended: no anchor carried into the next stroke.
        assert_eq!(interp.queue_len(), 0);
        let layers = interp.take_output();
        assert_eq!(layers[0][3].distance, 2.0);
    }

    #[test]
    fn test_layers_persist_until_taken() {
        let mut interp = Interpolator::default();
        assert_eq!(interp.add_layer(), 1);
        interp.push_sample(sample(0.0));
        interp.push_sample(sample(1.0));
        interp.run_frame(1, 1);
        interp.push_sample(sample(2.0));
        interp.run_frame(1, 1);
        assert_eq!(interp.output().layer(0).len(), 4);
        let layers = interp.take_output();
        assert_eq!(layers.len(), 2);
        assert_eq!(interp.output().total_points(), 0);
        interp.clear_layers();
        assert_eq!(interp.output().layer_count(), 1);
    }
}
