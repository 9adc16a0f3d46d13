//! Rhai registration for the point boundary and the host capability surface.
//!
//! `ShaderPaintPoint` is exposed as a value type with field accessors named in
//! wire order (`x, y, time, size, speed, distance, counter`). The engine is
//! built with `f32_float`, so every field crosses the boundary as an `f32` and
//! is never widened.
//!
//! The only host functions scripts can reach are:
//! - `pushPoint(sink, layer, point)` - append a point to an output layer
//! - `pullPointPair(sink, buffer)` - pull the next pending pair into a buffer
//! - `log(message)` - write to the script log

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, FLOAT, INT};

use crate::output_sink::OutputSink;
use crate::point::ShaderPaintPoint;
use crate::point_queue::{PointQueue, Pull};
use crate::script_diagnostics::BOUNDARY_ERROR_PREFIX;
use crate::script_log::{script_log, stringify_dynamic, LogLevel};

/// Script-visible handle to the frame's output layers and pending samples.
///
/// Cloning shares the same underlying buffers.
#[derive(Clone)]
pub struct FrameSink {
    output: Rc<RefCell<OutputSink>>,
    queue: Rc<RefCell<PointQueue>>,
}

impl FrameSink {
    pub fn new(output: Rc<RefCell<OutputSink>>, queue: Rc<RefCell<PointQueue>>) -> Self {
        Self { output, queue }
    }

    fn push_point(&mut self, layer: INT, point: ShaderPaintPoint) -> Result<(), Box<EvalAltResult>> {
        let mut output = self.output.borrow_mut();
        let pushed = usize::try_from(layer)
            .map(|idx| output.push(idx, point))
            .unwrap_or(false);
        if pushed {
            Ok(())
        } else {
            Err(format!(
                "{} pushPoint: layer {} does not exist ({} layers)",
                BOUNDARY_ERROR_PREFIX,
                layer,
                output.layer_count()
            )
            .into())
        }
    }

    fn pull_pair(&mut self, buffer: &PointPairBuffer) -> INT {
        let pull = self.queue.borrow_mut().pull();
        let mut slots = buffer.slots.borrow_mut();
        match pull {
            Pull::Pair(a, b) => {
                slots[0] = a;
                slots[1] = b;
            }
            Pull::Anchor(a) => slots[0] = a,
            Pull::Empty => {}
        }
        pull.count()
    }
}

/// Two-slot buffer filled by `pullPointPair`. Cloning shares the slots, so the
/// host can write into a buffer the script passed by value.
#[derive(Clone, Default)]
pub struct PointPairBuffer {
    slots: Rc<RefCell<[ShaderPaintPoint; 2]>>,
}

impl PointPairBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, index: INT) -> Result<usize, Box<EvalAltResult>> {
        match index {
            0 | 1 => Ok(index as usize),
            _ => Err(EvalAltResult::ErrorArrayBounds(2, index, rhai::Position::NONE).into()),
        }
    }
}

fn describe_point(p: &ShaderPaintPoint) -> String {
    format!(
        "ShaderPaintPoint(x: {}, y: {}, time: {}, size: {}, speed: {}, distance: {}, counter: {})",
        p.pos.x, p.pos.y, p.time, p.size, p.speed, p.distance, p.counter
    )
}

macro_rules! register_point_field {
    ($engine:expr, $name:literal, $($field:ident).+) => {
        $engine.register_get_set(
            $name,
            |p: &mut ShaderPaintPoint| p.$($field).+,
            |p: &mut ShaderPaintPoint, value: f32| p.$($field).+ = value,
        );
        $engine.register_set($name, |p: &mut ShaderPaintPoint, value: INT| {
            p.$($field).+ = value as f32
        });
    };
}

/// Register the `ShaderPaintPoint` and `PointPairBuffer` types.
pub fn register_point_api(engine: &mut Engine) {
    engine.register_type_with_name::<ShaderPaintPoint>("ShaderPaintPoint");

    register_point_field!(engine, "x", pos.x);
    register_point_field!(engine, "y", pos.y);
    register_point_field!(engine, "time", time);
    register_point_field!(engine, "size", size);
    register_point_field!(engine, "speed", speed);
    register_point_field!(engine, "distance", distance);
    register_point_field!(engine, "counter", counter);

    engine.register_fn("ShaderPaintPoint", ShaderPaintPoint::default);
    engine.register_fn(
        "ShaderPaintPoint",
        |x: f32, y: f32, time: f32, size: f32, speed: f32, distance: f32, counter: f32| {
            ShaderPaintPoint::new(x, y, time, size, speed, distance, counter)
        },
    );
    engine.register_fn("to_string", |p: &mut ShaderPaintPoint| describe_point(p));
    engine.register_fn("to_debug", |p: &mut ShaderPaintPoint| describe_point(p));

    engine.register_type_with_name::<PointPairBuffer>("PointPairBuffer");
    engine.register_fn("PointPairBuffer", PointPairBuffer::new);
    engine.register_fn("len", |_b: &mut PointPairBuffer| 2 as INT);
    engine.register_indexer_get(
        |b: &mut PointPairBuffer, index: INT| -> Result<ShaderPaintPoint, Box<EvalAltResult>> {
            let slot = b.slot(index)?;
            Ok(b.slots.borrow()[slot])
        },
    );
    engine.register_indexer_set(
        |b: &mut PointPairBuffer, index: INT, point: ShaderPaintPoint| -> Result<(), Box<EvalAltResult>> {
            let slot = b.slot(index)?;
            b.slots.borrow_mut()[slot] = point;
            Ok(())
        },
    );

    engine.register_type_with_name::<FrameSink>("FrameSink");
}

/// Register the host functions scripts are allowed to call.
pub fn register_capabilities(engine: &mut Engine) {
    engine.register_fn("pushPoint", FrameSink::push_point);
    engine.register_fn("pullPointPair", |sink: &mut FrameSink, buffer: PointPairBuffer| {
        sink.pull_pair(&buffer)
    });

    engine
        .register_fn("log", |message: ImmutableString| {
            script_log(LogLevel::Info, message.as_str());
        })
        .register_fn("log", |value: FLOAT| {
            script_log(LogLevel::Info, &value.to_string());
        })
        .register_fn("log", |value: INT| {
            script_log(LogLevel::Info, &value.to_string());
        })
        .register_fn("log", |point: ShaderPaintPoint| {
            script_log(LogLevel::Info, &describe_point(&point));
        })
        .register_fn("log", |value: Dynamic| {
            script_log(LogLevel::Info, &stringify_dynamic(&value));
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Scope;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register_point_api(&mut engine);
        register_capabilities(&mut engine);
        engine
    }

    fn frame_sink() -> (FrameSink, Rc<RefCell<OutputSink>>, Rc<RefCell<PointQueue>>) {
        let output = Rc::new(RefCell::new(OutputSink::with_layers(2)));
        let queue = Rc::new(RefCell::new(PointQueue::new()));
        (FrameSink::new(output.clone(), queue.clone()), output, queue)
    }

    #[test]
    fn test_point_fields_round_trip() {
        let engine = engine();
        let p = ShaderPaintPoint::new(0.1, -2.5e7, 1.0e-30, 3.3, f32::MAX, 7.77, 12.0);
        let mut scope = Scope::new();
        scope.push("p", p);

        let back: ShaderPaintPoint = engine
            .eval_with_scope(
                &mut scope,
                "let q = ShaderPaintPoint(); \
                 q.x = p.x; q.y = p.y; q.time = p.time; q.size = p.size; \
                 q.speed = p.speed; q.distance = p.distance; q.counter = p.counter; q",
            )
            .unwrap();
        assert!(back.bits_eq(&p));
    }

    #[test]
    fn test_field_reads_are_f32() {
        let engine = engine();
        let mut scope = Scope::new();
        scope.push("p", ShaderPaintPoint::new(0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        let x: f32 = engine.eval_with_scope(&mut scope, "p.x").unwrap();
        assert_eq!(x.to_bits(), 0.1f32.to_bits());
    }

    #[test]
    fn test_integer_assignment_converts() {
        let engine = engine();
        let p: ShaderPaintPoint = engine
            .eval("let p = ShaderPaintPoint(); p.size = 4; p")
            .unwrap();
        assert_eq!(p.size, 4.0);
    }

    #[test]
    fn test_assignment_copies_value() {
        let engine = engine();
        let p: ShaderPaintPoint = engine
            .eval("let a = ShaderPaintPoint(); let b = a; b.x = 9.0; a")
            .unwrap();
        assert_eq!(p.pos.x, 0.0);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let engine = engine();
        let result = engine.eval::<Dynamic>("let p = ShaderPaintPoint(); p.pressure");
        assert!(result.is_err());
    }

    #[test]
    fn test_push_point() {
        let engine = engine();
        let (sink, output, _) = frame_sink();
        let mut scope = Scope::new();
        scope.push("sink", sink);

        engine
            .run_with_scope(
                &mut scope,
                "pushPoint(sink, 1, ShaderPaintPoint(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0));",
            )
            .unwrap();
        assert_eq!(output.borrow().layer(1).len(), 1);
        assert_eq!(output.borrow().layer(1)[0].distance, 6.0);
    }

    #[test]
    fn test_push_point_bad_layer() {
        let engine = engine();
        let (sink, output, _) = frame_sink();
        let mut scope = Scope::new();
        scope.push("sink", sink);

        let err = engine
            .run_with_scope(&mut scope, "pushPoint(sink, 5, ShaderPaintPoint());")
            .unwrap_err();
        assert!(err.to_string().contains(BOUNDARY_ERROR_PREFIX));
        assert_eq!(output.borrow().total_points(), 0);
    }

    #[test]
    fn test_pull_point_pair() {
        let engine = engine();
        let (sink, _, queue) = frame_sink();
        for i in 0..3 {
            queue
                .borrow_mut()
                .push(ShaderPaintPoint::new(i as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        }
        let mut scope = Scope::new();
        scope.push("sink", sink);

        let out: rhai::Array = engine
            .eval_with_scope(
                &mut scope,
                "let buf = PointPairBuffer(); \
                 let out = []; \
                 let n = pullPointPair(sink, buf); out.push(n); out.push(buf[0].x); out.push(buf[1].x); \
                 n = pullPointPair(sink, buf); out.push(n); \
                 n = pullPointPair(sink, buf); out.push(n); out.push(buf[0].x); \
                 out",
            )
            .unwrap();
        assert_eq!(out[0].as_int().unwrap(), 2);
        assert_eq!(out[1].as_float().unwrap(), 0.0);
        assert_eq!(out[2].as_float().unwrap(), 1.0);
        assert_eq!(out[3].as_int().unwrap(), 2);
        assert_eq!(out[4].as_int().unwrap(), 1);
        assert_eq!(out[5].as_float().unwrap(), 2.0);
        assert_eq!(queue.borrow().len(), 1);
    }

    #[test]
    fn test_buffer_index_out_of_range() {
        let engine = engine();
        assert!(engine.eval::<Dynamic>("let b = PointPairBuffer(); b[2]").is_err());
    }

    #[test]
    fn test_log_numbers_is_a_message() {
        let engine = engine();
        assert!(engine.eval::<Dynamic>("log(100.0)").unwrap().is_unit());
        assert!(engine.eval::<Dynamic>("log(100)").unwrap().is_unit());
        assert!(engine
            .eval::<Dynamic>("let p = ShaderPaintPoint(); p.x = 2.5; log(p.x)")
            .unwrap()
            .is_unit());
    }
}
