//! Backend talking to the pigpio daemon over its socket interface.
//!
//! Commands are 16-byte little-endian frames `cmd, p1, p2, p3` answered by
//! the same frame with the result in place of `p3`; a negative result is a
//! pigpio error code. Edge notifications arrive on a second connection
//! turned into a notification stream by `NOIB`, as 12-byte reports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{
    Backend, Capabilities, ChipInfo, ChipOptions, Direction, Edge, EdgeKind, EdgeWait, HardwarePwm,
    LineHandle, LineInfo, LineRequest,
};
use crate::errors::{Error, Result};
use crate::types::{Flags, Mode, State};

pub const PIGPIO: &str = "pigpio";

/// User-accessible GPIOs on the Broadcom SoCs pigpio drives.
const LINES: u32 = 54;
/// Notifications only cover bank 1.
const NOTIFY_LINES: u32 = 32;
/// Duty cycle range programmed on every PWM line.
pub const PWM_RANGE: u32 = 40_000;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: &str = "8888";

const MODES: &[Mode] = &[Mode::Input, Mode::Output, Mode::Pwm];

mod cmd {
    pub const MODES: u32 = 0;
    pub const MODEG: u32 = 1;
    pub const PUD: u32 = 2;
    pub const READ: u32 = 3;
    pub const WRITE: u32 = 4;
    pub const PWM: u32 = 5;
    pub const PRS: u32 = 6;
    pub const PFS: u32 = 7;
    pub const HWVER: u32 = 17;
    pub const NB: u32 = 19;
    pub const NC: u32 = 21;
    pub const PFG: u32 = 23;
    pub const GDC: u32 = 83;
    pub const NOIB: u32 = 99;
}

const PI_INPUT: u32 = 0;
const PI_OUTPUT: u32 = 1;

const PI_PUD_OFF: u32 = 0;
const PI_PUD_DOWN: u32 = 1;
const PI_PUD_UP: u32 = 2;

const PI_NTFY_FLAGS_EVENT: u16 = 1 << 7;
const PI_NTFY_FLAGS_ALIVE: u16 = 1 << 6;
const PI_NTFY_FLAGS_WDOG: u16 = 1 << 5;

const REPORT_SIZE: usize = 12;

/// Daemon address from the chip parameter, the options, or pigpio's own
/// `PIGPIO_ADDR`/`PIGPIO_PORT` environment variables, in that order.
fn daemon_addr(param: &str, options: &ChipOptions) -> String {
    let addr = if !param.is_empty() {
        param.to_owned()
    } else if let Some(addr) = &options.pigpio_addr {
        addr.clone()
    } else {
        let host = std::env::var("PIGPIO_ADDR").unwrap_or_else(|_| DEFAULT_HOST.to_owned());
        let port = std::env::var("PIGPIO_PORT").unwrap_or_else(|_| DEFAULT_PORT.to_owned());
        return format!("{host}:{port}");
    };

    if addr.contains(':') {
        addr
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

pub fn open(param: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>> {
    let target = if param.is_empty() {
        PIGPIO.to_owned()
    } else {
        format!("{PIGPIO}:{param}")
    };
    let addr = daemon_addr(param, options);

    let socket = CommandSocket::connect(&addr)
        .map_err(|e| Error::resource(&target, "connect to daemon", e))?;
    let hw_rev = socket
        .command(cmd::HWVER, 0, 0)
        .map_err(|e| Error::resource(&target, "get hardware revision", e))?;
    log::debug!("{target}: connected to {addr}, hardware revision {hw_rev:#x}");

    Ok(Arc::new(PigpioChip {
        id: param.to_owned(),
        addr,
        hw_rev,
        socket: Arc::new(socket),
    }))
}

fn pigpio_error(code: i32) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("pigpio error {code}"))
}

/// The command connection, shared by the chip and all its lines.
#[derive(Debug)]
struct CommandSocket {
    stream: Mutex<TcpStream>,
}

impl CommandSocket {
    fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    fn command(&self, cmd: u32, p1: u32, p2: u32) -> io::Result<u32> {
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        let res = exchange(&mut *stream, cmd, p1, p2)?;
        u32::try_from(res).map_err(|_| pigpio_error(res))
    }
}

/// Sends one command frame and reads back its result field.
fn exchange(mut stream: impl Read + Write, cmd: u32, p1: u32, p2: u32) -> io::Result<i32> {
    let mut frame = [0u8; 16];
    frame[0..4].copy_from_slice(&cmd.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    stream.write_all(&frame)?;

    stream.read_exact(&mut frame)?;
    Ok(i32::from_le_bytes([frame[12], frame[13], frame[14], frame[15]]))
}

/// `gpioReport_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Report {
    seqno: u16,
    flags: u16,
    tick: u32,
    level: u32,
}

impl Report {
    fn from_bytes(buf: &[u8; REPORT_SIZE]) -> Self {
        Self {
            seqno: u16::from_le_bytes([buf[0], buf[1]]),
            flags: u16::from_le_bytes([buf[2], buf[3]]),
            tick: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            level: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }

    /// Watchdog, keep-alive and event reports carry no level change.
    fn is_level_change(&self) -> bool {
        self.flags & (PI_NTFY_FLAGS_EVENT | PI_NTFY_FLAGS_ALIVE | PI_NTFY_FLAGS_WDOG) == 0
    }
}

#[derive(Debug)]
struct PigpioChip {
    id: String,
    addr: String,
    hw_rev: u32,
    socket: Arc<CommandSocket>,
}

impl PigpioChip {
    fn line_target(&self, offset: u32) -> String {
        format!("{} pin {}", self.target(), offset)
    }

    fn command(&self, offset: u32, op: &'static str, cmd: u32, p2: u32) -> Result<u32> {
        self.socket
            .command(cmd, offset, p2)
            .map_err(|e| Error::resource(self.line_target(offset), op, e))
    }

    fn open_notify(&self, offset: u32) -> Result<Notify> {
        let target = self.line_target(offset);

        let stream = TcpStream::connect(&self.addr)
            .map_err(|e| Error::resource(&target, "connect notification stream", e))?;
        let handle = exchange(&stream, cmd::NOIB, 0, 0)
            .and_then(|res| u32::try_from(res).map_err(|_| pigpio_error(res)))
            .map_err(|e| Error::resource(&target, "open notification handle", e))?;

        if let Err(e) = self.socket.command(cmd::NB, handle, 1 << offset) {
            let _ = self.socket.command(cmd::NC, handle, 0);
            return Err(Error::resource(&target, "start notification", e));
        }
        Ok(Notify {
            stream,
            handle,
            woken: AtomicBool::new(false),
            last: AtomicU8::new(LEVEL_UNKNOWN),
        })
    }
}

impl Backend for PigpioChip {
    fn kind(&self) -> &str {
        PIGPIO
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn chip_info(&self) -> Result<ChipInfo> {
        Ok(ChipInfo {
            label: format!("pigpio rev {:x} at {}", self.hw_rev, self.addr),
            lines: LINES,
        })
    }

    fn line_info(&self, offset: u32) -> Result<LineInfo> {
        let direction = match self.command(offset, "get pin mode", cmd::MODEG, 0)? {
            PI_INPUT => Some(Direction::Input),
            PI_OUTPUT => Some(Direction::Output),
            _ => None,
        };
        Ok(LineInfo {
            name: format!("GPIO{offset}"),
            direction,
            ..LineInfo::default()
        })
    }

    fn capabilities(&self, _offset: u32) -> Capabilities {
        Capabilities {
            modes: MODES,
            input_flags: Flags::PULL_UP | Flags::PULL_DOWN,
            output_flags: Flags::empty(),
            hardware_pwm: true,
        }
    }

    fn open_line(&self, offset: u32, request: &LineRequest) -> Result<Box<dyn LineHandle>> {
        if offset >= LINES {
            return Err(Error::invalid_argument(
                self.line_target(offset),
                "No such line",
            ));
        }

        let notify = match request.direction {
            Direction::Input => {
                self.command(offset, "set pin as input", cmd::MODES, PI_INPUT)?;

                let pud = if request.flags.contains(Flags::PULL_UP) {
                    PI_PUD_UP
                } else if request.flags.contains(Flags::PULL_DOWN) {
                    PI_PUD_DOWN
                } else {
                    PI_PUD_OFF
                };
                self.command(offset, "set pull-up/down", cmd::PUD, pud)?;

                if offset < NOTIFY_LINES {
                    Some(self.open_notify(offset)?)
                } else {
                    None
                }
            }
            Direction::Output => {
                self.command(offset, "set pin as output", cmd::MODES, PI_OUTPUT)?;
                self.command(
                    offset,
                    "set pin state",
                    cmd::WRITE,
                    u32::from(request.initial.is_active()),
                )?;
                self.command(offset, "set PWM range", cmd::PRS, PWM_RANGE)?;
                None
            }
        };

        Ok(Box::new(PigpioLine {
            socket: self.socket.clone(),
            offset,
            direction: request.direction,
            notify,
            target: self.line_target(offset),
        }))
    }
}

const LEVEL_UNKNOWN: u8 = 2;

/// A notification stream watching one line.
#[derive(Debug)]
struct Notify {
    stream: TcpStream,
    handle: u32,
    woken: AtomicBool,
    /// Last level reported, or [`LEVEL_UNKNOWN`].
    last: AtomicU8,
}

#[derive(Debug)]
struct PigpioLine {
    socket: Arc<CommandSocket>,
    offset: u32,
    direction: Direction,
    notify: Option<Notify>,
    target: String,
}

impl PigpioLine {
    fn command(&self, op: &'static str, cmd: u32, p2: u32) -> Result<u32> {
        self.socket
            .command(cmd, self.offset, p2)
            .map_err(|e| Error::resource(&self.target, op, e))
    }
}

impl LineHandle for PigpioLine {
    fn read(&self) -> Result<State> {
        Ok(State::new(self.command("get pin state", cmd::READ, 0)? != 0))
    }

    fn write(&self, state: State) -> Result<()> {
        self.command("set pin state", cmd::WRITE, u32::from(state.is_active()))?;
        Ok(())
    }

    fn supports_edges(&self) -> bool {
        self.notify.is_some()
    }

    fn await_edge(&self) -> Result<EdgeWait> {
        let Some(notify) = &self.notify else {
            return Ok(EdgeWait::Closed);
        };

        let mut buf = [0u8; REPORT_SIZE];
        loop {
            if let Err(e) = (&notify.stream).read_exact(&mut buf) {
                if notify.woken.load(Ordering::Acquire)
                    || e.kind() == io::ErrorKind::UnexpectedEof
                {
                    return Ok(EdgeWait::Closed);
                }
                return Err(Error::resource(&self.target, "read notification", e));
            }

            let report = Report::from_bytes(&buf);
            log::trace!(
                "{}: report {} flags {:#x} level {:#x}",
                self.target,
                report.seqno,
                report.flags,
                report.level
            );
            if !report.is_level_change() {
                continue;
            }

            let level = u8::from(report.level & (1 << self.offset) != 0);
            if notify.last.swap(level, Ordering::AcqRel) == level {
                continue;
            }

            return Ok(EdgeWait::Edge(Edge {
                kind: if level == 1 {
                    EdgeKind::Rising
                } else {
                    EdgeKind::Falling
                },
                timestamp_ns: Some(u64::from(report.tick) * 1_000),
            }));
        }
    }

    fn wake(&self) {
        if let Some(notify) = &self.notify {
            notify.woken.store(true, Ordering::Release);
            let _ = notify.stream.shutdown(Shutdown::Both);
        }
    }

    fn hardware_pwm(&self) -> Option<&dyn HardwarePwm> {
        match self.direction {
            Direction::Output => Some(self),
            Direction::Input => None,
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        if let Some(notify) = &self.notify {
            let _ = notify.stream.shutdown(Shutdown::Both);
            self.socket
                .command(cmd::NC, notify.handle, 0)
                .map_err(|e| Error::resource(&self.target, "close notification handle", e))?;
        }
        Ok(())
    }
}

impl HardwarePwm for PigpioLine {
    fn set_pwm_frequency(&self, hz: u32) -> Result<u32> {
        self.command("set PWM frequency", cmd::PFS, hz)
    }

    fn pwm_frequency(&self) -> Result<u32> {
        self.command("get PWM frequency", cmd::PFG, 0)
    }

    fn set_pwm_duty(&self, duty: u32) -> Result<()> {
        self.command("set PWM duty cycle", cmd::PWM, duty)?;
        Ok(())
    }

    fn pwm_duty(&self) -> Result<u32> {
        self.command("get PWM duty cycle", cmd::GDC, 0)
    }

    fn pwm_range(&self) -> u32 {
        PWM_RANGE
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    type Log = Arc<Mutex<Vec<(u32, u32, u32)>>>;

    /// Answers commands on one connection until the peer hangs up.
    fn fake_daemon() -> (String, Log, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let log: Log = Default::default();

        let seen = log.clone();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut frame = [0u8; 16];
            while conn.read_exact(&mut frame).is_ok() {
                let word = |at: usize| {
                    u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
                };
                let (c, p1, p2) = (word(0), word(4), word(8));
                seen.lock().unwrap().push((c, p1, p2));

                let res: i32 = match c {
                    cmd::HWVER => 0xa02082,
                    cmd::MODEG => 1,
                    cmd::READ => 1,
                    cmd::PFS => p2 as i32,
                    cmd::PFG => 800,
                    cmd::GDC => 20_000,
                    cmd::PWM if p2 > PWM_RANGE => -8,
                    _ => 0,
                };
                frame[12..16].copy_from_slice(&res.to_le_bytes());
                conn.write_all(&frame).unwrap();
            }
        });

        (addr, log, server)
    }

    #[test]
    fn output_line_and_pwm() {
        let (addr, log, server) = fake_daemon();
        {
            let chip = open(&addr, &ChipOptions::default()).unwrap();
            assert_eq!(chip.chip_info().unwrap().lines, LINES);
            assert_eq!(
                chip.line_info(4).unwrap().direction,
                Some(Direction::Output)
            );

            let request = LineRequest {
                direction: Direction::Output,
                flags: Flags::empty(),
                initial: State::Active,
            };
            let line = chip.open_line(4, &request).unwrap();
            assert_eq!(line.read().unwrap(), State::Active);
            assert!(!line.supports_edges());

            let pwm = line.hardware_pwm().unwrap();
            assert_eq!(pwm.set_pwm_frequency(1000).unwrap(), 1000);
            assert_eq!(pwm.pwm_frequency().unwrap(), 800);
            assert_eq!(pwm.pwm_duty().unwrap(), 20_000);

            let err = pwm.set_pwm_duty(PWM_RANGE + 1).unwrap_err();
            assert_eq!(err.target(), format!("pigpio:{addr} pin 4"));

            line.close().unwrap();
        }
        server.join().unwrap();

        let log = log.lock().unwrap();
        assert!(log.contains(&(cmd::MODES, 4, PI_OUTPUT)));
        assert!(log.contains(&(cmd::WRITE, 4, 1)));
        assert!(log.contains(&(cmd::PRS, 4, PWM_RANGE)));
    }

    #[test]
    fn report_flags() {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0..2].copy_from_slice(&7u16.to_le_bytes());
        buf[4..8].copy_from_slice(&1234u32.to_le_bytes());
        buf[8..12].copy_from_slice(&(1u32 << 17).to_le_bytes());

        let report = Report::from_bytes(&buf);
        assert_eq!(report.seqno, 7);
        assert_eq!(report.tick, 1234);
        assert_eq!(report.level, 1 << 17);
        assert!(report.is_level_change());

        buf[2..4].copy_from_slice(&PI_NTFY_FLAGS_ALIVE.to_le_bytes());
        assert!(!Report::from_bytes(&buf).is_level_change());
    }

    #[test]
    fn addr_resolution() {
        let options = ChipOptions::default().with_pigpio_addr("raspberrypi");
        assert_eq!(daemon_addr("", &options), "raspberrypi:8888");
        assert_eq!(daemon_addr("10.0.0.2:9999", &options), "10.0.0.2:9999");
    }
}
