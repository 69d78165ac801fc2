//! Waveform output.
//!
//! The [`Tracer`] trait receives the declared signals once before time zero
//! and then one change per signal per time point, in signal order, with
//! non-decreasing times. Tracers see committed values only.
//!
//! [`VcdTracer`] writes IEEE 1364 Value Change Dump text that GTKWave,
//! Surfer and other viewers read. [`MemoryTracer`] keeps the event list for
//! inspection, and [`DigestTracer`] reduces the stream to an xxh3 hash so two
//! runs can be compared cheaply.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::rc::Rc;

use serde::Serialize;
use tessel_common::{ContentHash, ContentHasher, Logic, Period, Value};
use tessel_netlist::{Netlist, Shape, SignalId};

use crate::error::SimError;
use crate::store::SignalStore;

/// A signal as announced to a tracer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceSignal {
    /// The signal's ID.
    pub id: SignalId,
    /// Dotted hierarchical name.
    pub name: String,
    /// Width and signedness.
    pub shape: Shape,
    /// Value at time zero, before any process ran.
    pub initial: Value,
}

impl TraceSignal {
    /// Describes every signal of a netlist with its value in `store`.
    pub fn collect(netlist: &Netlist, store: &SignalStore) -> Vec<TraceSignal> {
        netlist
            .signals
            .iter()
            .map(|(id, decl)| TraceSignal {
                id,
                name: decl.name.clone(),
                shape: decl.shape,
                initial: store.current(id).clone(),
            })
            .collect()
    }
}

/// Receives signal changes as the simulation commits them.
pub trait Tracer {
    /// Announces the traced signals. Called once, before time zero.
    fn declare(&mut self, signals: &[TraceSignal]) -> Result<(), SimError>;

    /// Records that `signal` holds `value` at the end of time point `time`.
    fn change(&mut self, time: Period, signal: SignalId, value: &Value) -> Result<(), SimError>;

    /// Called once when the simulation ends.
    fn finish(&mut self, time: Period) -> Result<(), SimError>;
}

/// VCD writer following IEEE 1364.
///
/// Dotted names become nested scopes below a root `top` scope. Timestamps
/// count multiples of the timescale, rounded down.
pub struct VcdTracer<W: Write> {
    writer: W,
    timescale: Period,
    vars: BTreeMap<SignalId, Var>,
    /// Zero-width signals, which VCD cannot represent.
    skipped: BTreeSet<SignalId>,
    stamp: Option<u64>,
}

#[derive(Debug, Clone)]
struct Var {
    code: String,
    width: u32,
}

impl<W: Write> VcdTracer<W> {
    /// Creates a writer with the given time unit.
    ///
    /// # Panics
    ///
    /// Panics if `timescale` is zero.
    pub fn new(writer: W, timescale: Period) -> Self {
        assert!(!timescale.is_zero(), "VCD timescale must be non-zero");
        Self {
            writer,
            timescale,
            vars: BTreeMap::new(),
            skipped: BTreeSet::new(),
            stamp: None,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Generates an identifier code from a sequential index using the 94
    /// printable ASCII characters from `!` to `~`.
    fn id_code(index: usize) -> String {
        let mut code = String::new();
        let mut rest = index;
        loop {
            code.push(char::from(b'!' + (rest % 94) as u8));
            rest /= 94;
            if rest == 0 {
                break;
            }
            rest -= 1;
        }
        code
    }

    fn write_value(&mut self, var: &Var, value: &Value) -> Result<(), SimError> {
        if var.width == 1 {
            let bit = match value.get(0) {
                Logic::Zero => '0',
                Logic::One => '1',
                Logic::X => 'x',
            };
            writeln!(self.writer, "{bit}{}", var.code)?;
        } else {
            writeln!(self.writer, "b{value} {}", var.code)?;
        }
        Ok(())
    }

    fn write_stamp(&mut self, time: Period) -> Result<(), SimError> {
        let stamp = time.as_fs() / self.timescale.as_fs();
        if self.stamp != Some(stamp) {
            writeln!(self.writer, "#{stamp}")?;
            self.stamp = Some(stamp);
        }
        Ok(())
    }
}

impl<W: Write> Tracer for VcdTracer<W> {
    fn declare(&mut self, signals: &[TraceSignal]) -> Result<(), SimError> {
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  Tessel logic simulator")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale {} $end", self.timescale)?;

        let mut ordered: Vec<(Vec<&str>, &TraceSignal)> = signals
            .iter()
            .map(|s| {
                let mut path: Vec<&str> = s.name.split('.').collect();
                path.pop();
                (path, s)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        writeln!(self.writer, "$scope module top $end")?;
        let mut open: Vec<&str> = Vec::new();
        for (path, signal) in &ordered {
            let common = open
                .iter()
                .zip(path.iter())
                .take_while(|(a, b)| a == b)
                .count();
            for _ in common..open.len() {
                writeln!(self.writer, "$upscope $end")?;
            }
            open.truncate(common);
            for scope in &path[common..] {
                writeln!(self.writer, "$scope module {scope} $end")?;
                open.push(*scope);
            }

            let width = signal.shape.width;
            if width == 0 {
                self.skipped.insert(signal.id);
                continue;
            }
            let code = Self::id_code(self.vars.len());
            let leaf = signal.name.rsplit('.').next().unwrap_or(&signal.name);
            writeln!(self.writer, "$var wire {width} {code} {leaf} $end")?;
            self.vars.insert(signal.id, Var { code, width });
        }
        for _ in 0..open.len() {
            writeln!(self.writer, "$upscope $end")?;
        }
        writeln!(self.writer, "$upscope $end")?;
        writeln!(self.writer, "$enddefinitions $end")?;

        self.write_stamp(Period::ZERO)?;
        writeln!(self.writer, "$dumpvars")?;
        for signal in signals {
            if let Some(var) = self.vars.get(&signal.id).cloned() {
                self.write_value(&var, &signal.initial)?;
            }
        }
        writeln!(self.writer, "$end")?;
        Ok(())
    }

    fn change(&mut self, time: Period, signal: SignalId, value: &Value) -> Result<(), SimError> {
        let Some(var) = self.vars.get(&signal).cloned() else {
            if self.skipped.contains(&signal) {
                return Ok(());
            }
            return Err(SimError::UnknownSignal {
                name: signal.to_string(),
            });
        };
        self.write_stamp(time)?;
        self.write_value(&var, value)
    }

    fn finish(&mut self, time: Period) -> Result<(), SimError> {
        self.write_stamp(time)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    /// End of the time point the change belongs to.
    pub time: Period,
    /// The changed signal.
    pub signal: SignalId,
    /// Its new value.
    pub value: Value,
}

#[derive(Debug, Default)]
struct TraceData {
    signals: Vec<TraceSignal>,
    events: Vec<TraceEvent>,
    end: Option<Period>,
}

/// Records every change in memory.
///
/// The records are read through the [`TraceLog`] handle returned alongside
/// the tracer, which stays usable after the tracer moved into a simulator.
#[derive(Debug)]
pub struct MemoryTracer {
    data: Rc<RefCell<TraceData>>,
}

/// Read handle for the records of a [`MemoryTracer`].
#[derive(Debug, Clone)]
pub struct TraceLog {
    data: Rc<RefCell<TraceData>>,
}

impl MemoryTracer {
    /// Creates a tracer and the handle to read its records.
    pub fn new() -> (MemoryTracer, TraceLog) {
        let data = Rc::new(RefCell::new(TraceData::default()));
        (
            MemoryTracer { data: data.clone() },
            TraceLog { data },
        )
    }
}

impl Tracer for MemoryTracer {
    fn declare(&mut self, signals: &[TraceSignal]) -> Result<(), SimError> {
        self.data.borrow_mut().signals = signals.to_vec();
        Ok(())
    }

    fn change(&mut self, time: Period, signal: SignalId, value: &Value) -> Result<(), SimError> {
        self.data.borrow_mut().events.push(TraceEvent {
            time,
            signal,
            value: value.clone(),
        });
        Ok(())
    }

    fn finish(&mut self, time: Period) -> Result<(), SimError> {
        self.data.borrow_mut().end = Some(time);
        Ok(())
    }
}

impl TraceLog {
    /// The declared signals.
    pub fn signals(&self) -> Vec<TraceSignal> {
        self.data.borrow().signals.clone()
    }

    /// Every recorded change, in order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.data.borrow().events.clone()
    }

    /// The changes of one signal as `(time, value)` pairs.
    pub fn history(&self, signal: SignalId) -> Vec<(Period, Value)> {
        self.data
            .borrow()
            .events
            .iter()
            .filter(|e| e.signal == signal)
            .map(|e| (e.time, e.value.clone()))
            .collect()
    }

    /// The time passed to [`Tracer::finish`], if it was called.
    pub fn end(&self) -> Option<Period> {
        self.data.borrow().end
    }
}

/// Hashes the declared signals and every change into a [`ContentHash`].
///
/// Identical netlists driven by identical processes produce identical
/// digests.
#[derive(Debug)]
pub struct DigestTracer {
    hasher: Rc<RefCell<ContentHasher>>,
}

/// Read handle for the running digest of a [`DigestTracer`].
#[derive(Debug, Clone)]
pub struct TraceDigest {
    hasher: Rc<RefCell<ContentHasher>>,
}

impl DigestTracer {
    /// Creates a tracer and the handle to read its digest.
    pub fn new() -> (DigestTracer, TraceDigest) {
        let hasher = Rc::new(RefCell::new(ContentHasher::new()));
        (
            DigestTracer {
                hasher: hasher.clone(),
            },
            TraceDigest { hasher },
        )
    }
}

impl Tracer for DigestTracer {
    fn declare(&mut self, signals: &[TraceSignal]) -> Result<(), SimError> {
        let mut hasher = self.hasher.borrow_mut();
        for s in signals {
            hasher
                .u32(s.id.as_raw())
                .str(&s.name)
                .u32(s.shape.width)
                .bytes(&[u8::from(s.shape.signed)])
                .str(&s.initial.to_string());
        }
        Ok(())
    }

    fn change(&mut self, time: Period, signal: SignalId, value: &Value) -> Result<(), SimError> {
        self.hasher
            .borrow_mut()
            .u64(time.as_fs())
            .u32(signal.as_raw())
            .str(&value.to_string());
        Ok(())
    }

    fn finish(&mut self, time: Period) -> Result<(), SimError> {
        self.hasher.borrow_mut().str("end").u64(time.as_fs());
        Ok(())
    }
}

impl TraceDigest {
    /// The digest of everything traced so far.
    pub fn digest(&self) -> ContentHash {
        self.hasher.borrow().finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(id: u32, name: &str, width: u32, initial: Value) -> TraceSignal {
        TraceSignal {
            id: SignalId::from_raw(id),
            name: name.into(),
            shape: Shape::unsigned(width),
            initial,
        }
    }

    fn vcd_output(tracer: VcdTracer<Vec<u8>>) -> String {
        String::from_utf8(tracer.into_inner()).unwrap()
    }

    #[test]
    fn id_codes() {
        assert_eq!(VcdTracer::<Vec<u8>>::id_code(0), "!");
        assert_eq!(VcdTracer::<Vec<u8>>::id_code(1), "\"");
        assert_eq!(VcdTracer::<Vec<u8>>::id_code(93), "~");
        assert_eq!(VcdTracer::<Vec<u8>>::id_code(94), "!!");
        assert_eq!(VcdTracer::<Vec<u8>>::id_code(95), "\"!");
    }

    #[test]
    fn vcd_header_and_scopes() {
        let mut t = VcdTracer::new(Vec::new(), Period::from_ns(1));
        t.declare(&[
            signal(0, "clk", 1, Value::unknown(1)),
            signal(1, "cpu.alu.result", 4, Value::zero(4)),
            signal(2, "cpu.pc", 8, Value::from_u64(3, 8)),
        ])
        .unwrap();
        let out = vcd_output(t);
        let expected = "\
$version
  Tessel logic simulator
$end
$timescale 1ns $end
$scope module top $end
$var wire 1 ! clk $end
$scope module cpu $end
$var wire 8 \" pc $end
$scope module alu $end
$var wire 4 # result $end
$upscope $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
x!
b0000 #
b00000011 \"
$end
";
        assert_eq!(out, expected);
    }

    #[test]
    fn vcd_changes_share_timestamps() {
        let mut t = VcdTracer::new(Vec::new(), Period::from_ps(1));
        t.declare(&[
            signal(0, "a", 1, Value::zero(1)),
            signal(1, "b", 2, Value::zero(2)),
        ])
        .unwrap();
        let a = SignalId::from_raw(0);
        let b = SignalId::from_raw(1);
        t.change(Period::ZERO, a, &Value::from_bool(true)).unwrap();
        t.change(Period::from_ns(5), a, &Value::from_bool(false)).unwrap();
        t.change(Period::from_ns(5), b, &Value::from_binary_str("1x").unwrap())
            .unwrap();
        t.finish(Period::from_ns(7)).unwrap();
        let out = vcd_output(t);
        let body = out.split("$dumpvars\n0!\nb00 \"\n$end\n").nth(1).unwrap();
        assert_eq!(body, "1!\n#5000\n0!\nb1x \"\n#7000\n");
    }

    #[test]
    fn vcd_rejects_undeclared_signal() {
        let mut t = VcdTracer::new(Vec::new(), Period::from_ps(1));
        t.declare(&[]).unwrap();
        let err = t
            .change(Period::ZERO, SignalId::from_raw(3), &Value::zero(1))
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownSignal { .. }));
    }

    #[test]
    fn memory_tracer_records() {
        let (mut t, log) = MemoryTracer::new();
        t.declare(&[signal(0, "a", 1, Value::zero(1))]).unwrap();
        let a = SignalId::from_raw(0);
        t.change(Period::from_ns(1), a, &Value::from_bool(true)).unwrap();
        t.finish(Period::from_ns(2)).unwrap();
        assert_eq!(log.signals().len(), 1);
        assert_eq!(
            log.history(a),
            vec![(Period::from_ns(1), Value::from_bool(true))]
        );
        assert_eq!(log.end(), Some(Period::from_ns(2)));
        let json = serde_json::to_value(&log.events()[0]).unwrap();
        assert_eq!(json["signal"], 0);
    }

    #[test]
    fn digest_depends_on_events() {
        let run = |late: bool| {
            let (mut t, digest) = DigestTracer::new();
            t.declare(&[signal(0, "a", 1, Value::zero(1))]).unwrap();
            let time = if late { Period::from_ns(2) } else { Period::from_ns(1) };
            t.change(time, SignalId::from_raw(0), &Value::from_bool(true))
                .unwrap();
            digest.digest()
        };
        assert_eq!(run(false), run(false));
        assert_ne!(run(false), run(true));
    }
}
