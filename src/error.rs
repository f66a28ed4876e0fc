/// Failure while turning bytes into module entities.
///
/// Decoding never returns partial results: on any of these the whole
/// section (or value) being decoded is discarded.
#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum DecodeError {
    #[error("unexpected byte 0x{0:02X}")]
    InvalidByte(u8),
    #[error("buffer ended before the expected field")]
    AbruptStop,
    #[error("name is not valid UTF-8")]
    MalformedName,
    #[error("framed region was not consumed exactly")]
    WrongSize,
    #[error("allocation failed")]
    OutOfMemory,
    #[error("integer encoding overflows its width")]
    IntegerOverflow,
    #[error("missing `\\0asm` magic number")]
    BadMagic,
    #[error("unsupported binary version {0}")]
    UnsupportedVersion(u32),
    #[error("too many locals in function body")]
    TooManyLocals,
}

/// Failure while reconciling decoded sections into a runnable module.
#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum LinkError {
    #[error("type index {0} is not defined")]
    TypeIndexOutOfBounds(u32),
    #[error("{declared} functions declared but {bodies} bodies present")]
    FunctionCountMismatch { declared: usize, bodies: usize },
    #[error("function index {0} is not defined")]
    FunctionIndexOutOfBounds(u32),
    #[error("no export named `{0}`")]
    ExportNotFound(String),
    #[error("host module `{0}` has not been declared")]
    ModuleNotFound(String),
    #[error("data segment {0} does not fit in linear memory")]
    DataSegmentOutOfBounds(u32),
    #[error("memory of {0} pages exceeds the configured limit")]
    MemoryLimit(u32),
    #[error("allocation failed")]
    OutOfMemory,
}

/// Execution-time fault. A trap halts the VM for good.
#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum Trap {
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("bad instruction 0x{0:02X}")]
    BadInstruction(u8),
    #[error("operand has the wrong type")]
    BadType,
    #[error("host function not found")]
    FunctionNotFound,
    #[error("host module not found")]
    ModuleNotFound,
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("unreachable executed")]
    Unreachable,
    #[error("local index {0} out of bounds")]
    LocalOutOfBounds(u32),
    #[error("host function failed with status {0}")]
    HostFailure(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("trap: {0}")]
    Trap(#[from] Trap),
    #[error("function takes {expected} arguments but {actual} were given")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("virtual machine has trapped and cannot run again")]
    Trapped,
}
