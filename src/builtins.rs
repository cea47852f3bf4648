use crate::error::VmErrorKind;
use crate::peripherals::Peripherals;
use crate::thread::Thread;
use crate::value::{from_bool, is_truthy, truncate, Value};

/// Native operation behind a built-in opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    // math
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    MulFxp,
    SinFxp,
    CosFxp,

    // comparison + logic
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    Not,
    And,
    Or,

    // graphics
    DrawLine,
    FillRect,
    FillTriangle,
    PauseFrames,

    // keyboard
    KeyPressed,
    KeyReleased,
    KeyHeld,

    // random
    Random,
    SetRandomSeed,
}

/// A row of the built-in table
///
/// The arity is a property of the built-in, never of the bytecode, so the stack
/// effect of every built-in opcode is `1 - arity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub id: u8,
    pub name: &'static str,
    pub arity: usize,
    pub op: NativeOp,
}

impl Builtin {
    /// Net change of the operand-stack depth when this built-in runs
    pub fn stack_effect(&self) -> isize {
        1 - self.arity as isize
    }
}

const fn builtin(id: u8, name: &'static str, arity: usize, op: NativeOp) -> Builtin {
    Builtin {
        id,
        name,
        arity,
        op,
    }
}

/// All built-ins, sorted by id and grouped in ranges of 16
pub static BUILTINS: &[Builtin] = &[
    // math: 128..
    builtin(128, "+", 2, NativeOp::Add),
    builtin(129, "-", 2, NativeOp::Sub),
    builtin(130, "*", 2, NativeOp::Mul),
    builtin(131, "/", 2, NativeOp::Div),
    builtin(132, "%", 2, NativeOp::Mod),
    builtin(133, "<<", 2, NativeOp::Shl),
    builtin(134, ">>", 2, NativeOp::Shr),
    builtin(135, "mul@", 2, NativeOp::MulFxp),
    builtin(136, "sin@", 1, NativeOp::SinFxp),
    builtin(137, "cos@", 1, NativeOp::CosFxp),
    // comparison + logic: 144..
    builtin(144, "<", 2, NativeOp::Lt),
    builtin(145, "<=", 2, NativeOp::Le),
    builtin(146, "=", 2, NativeOp::Eq),
    builtin(147, "!=", 2, NativeOp::Ne),
    builtin(148, ">", 2, NativeOp::Gt),
    builtin(149, ">=", 2, NativeOp::Ge),
    builtin(150, "not", 1, NativeOp::Not),
    builtin(151, "and", 2, NativeOp::And),
    builtin(152, "or", 2, NativeOp::Or),
    // graphics: 176..
    builtin(176, "draw-line", 5, NativeOp::DrawLine),
    builtin(177, "fill-rect", 5, NativeOp::FillRect),
    builtin(178, "fill-triangle", 7, NativeOp::FillTriangle),
    builtin(179, "pause-frames", 1, NativeOp::PauseFrames),
    // keyboard: 192..
    builtin(192, "key-pressed?", 1, NativeOp::KeyPressed),
    builtin(193, "key-released?", 1, NativeOp::KeyReleased),
    builtin(194, "key-held?", 1, NativeOp::KeyHeld),
    // random: 208..
    builtin(208, "random", 0, NativeOp::Random),
    builtin(209, "set-random-seed!", 1, NativeOp::SetRandomSeed),
];

/// Widest argument list any built-in takes
pub const MAX_ARITY: usize = 7;

/// Find the built-in for an opcode byte
pub fn lookup(id: u8) -> Option<&'static Builtin> {
    BUILTINS
        .binary_search_by_key(&id, |b| b.id)
        .ok()
        .map(|index| &BUILTINS[index])
}

/// Find a built-in by its source-level name
pub fn by_name(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Invoke a native operation on already-popped arguments
///
/// `args` holds exactly `arity` values in push order (leftmost argument first).
/// The only built-in that touches the thread is `pause-frames`.
pub fn invoke<P: Peripherals>(
    op: NativeOp,
    args: &[Value],
    thread: &mut Thread,
    peripherals: &mut P,
) -> Result<Value, VmErrorKind> {
    let arg = |i: usize| args[i];
    let wide = |i: usize| args[i] as i32;

    let result = match op {
        NativeOp::Add => truncate(wide(0) + wide(1)),
        NativeOp::Sub => truncate(wide(0) - wide(1)),
        NativeOp::Mul => truncate(wide(0).wrapping_mul(wide(1))),
        NativeOp::Div => {
            if arg(1) == 0 {
                return Err(VmErrorKind::DivisionByZero);
            }
            truncate(wide(0) / wide(1))
        }
        NativeOp::Mod => {
            if arg(1) == 0 {
                return Err(VmErrorKind::DivisionByZero);
            }
            truncate(wide(0) % wide(1))
        }
        NativeOp::Shl => truncate(wide(0).wrapping_shl(arg(1) as u32 & 31)),
        NativeOp::Shr => truncate(wide(0).wrapping_shr(arg(1) as u32 & 31)),
        NativeOp::MulFxp => peripherals.mul_fxp(arg(0), arg(1)),
        NativeOp::SinFxp => peripherals.sin_fxp(arg(0)),
        NativeOp::CosFxp => peripherals.cos_fxp(arg(0)),

        NativeOp::Lt => from_bool(arg(0) < arg(1)),
        NativeOp::Le => from_bool(arg(0) <= arg(1)),
        NativeOp::Eq => from_bool(arg(0) == arg(1)),
        NativeOp::Ne => from_bool(arg(0) != arg(1)),
        NativeOp::Gt => from_bool(arg(0) > arg(1)),
        NativeOp::Ge => from_bool(arg(0) >= arg(1)),
        NativeOp::Not => from_bool(!is_truthy(arg(0))),
        NativeOp::And => from_bool(is_truthy(arg(0)) && is_truthy(arg(1))),
        NativeOp::Or => from_bool(is_truthy(arg(0)) || is_truthy(arg(1))),

        NativeOp::DrawLine => peripherals.draw_line(arg(0), arg(1), arg(2), arg(3), arg(4)),
        NativeOp::FillRect => peripherals.fill_rect(arg(0), arg(1), arg(2), arg(3), arg(4)),
        NativeOp::FillTriangle => peripherals.fill_triangle(
            arg(0),
            arg(1),
            arg(2),
            arg(3),
            arg(4),
            arg(5),
            arg(6),
        ),
        NativeOp::PauseFrames => {
            thread.pause_frames(arg(0));
            0
        }

        NativeOp::KeyPressed => peripherals.key_pressed(arg(0)),
        NativeOp::KeyReleased => peripherals.key_released(arg(0)),
        NativeOp::KeyHeld => peripherals.key_held(arg(0)),

        NativeOp::Random => peripherals.random(),
        NativeOp::SetRandomSeed => peripherals.set_random_seed(arg(0)),
    };

    Ok(result)
}
