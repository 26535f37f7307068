//! Binary dump codec for compiled functions.
//!
//! Integers use a variable-width encoding: a value that fits a signed byte
//! is written as that byte, unless the byte is one of the two sentinels.
//! `0x7F` announces a 16-bit little-endian value and `0x7E` a 32-bit one.
//! Strings go through a first-seen table: the first occurrence writes its
//! table index followed by the length and UTF-8 bytes, later occurrences
//! write only the index.
//!
//! A dump holds one function: the instructions between its `Meta` header
//! and the end of its body. Addresses inside the dump are relative to the
//! header and are relocated when the dump is loaded into a segment.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use core_types::{DumpError, SourceRef, Value};

use crate::opcode::{BinaryOp, MetaKind, OpCode};
use crate::segment::{ByteCode, CodeBlock};
use crate::symbol::SymbolRef;

/// Signature every dump starts with.
pub const DUMP_MAGIC: [u8; 4] = [0x1B, b'L', b'N', b'T'];

/// Instruction format version; dumps from other versions are rejected.
pub const DUMP_VERSION: u8 = 1;

const SENTINEL_16: i8 = 0x7F;
const SENTINEL_32: i8 = 0x7E;

/// Upper bound on capacity reserved up front for a count read from a stream.
/// Counts are untrusted; vectors grow past this as records actually arrive.
const MAX_PREALLOC: usize = 1024;

fn bounded_capacity(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

/// True if `bytes` starts with the dump signature.
pub fn is_dump(bytes: &[u8]) -> bool {
    bytes.starts_with(&DUMP_MAGIC)
}

/// Low-level writer for the dump encoding.
pub struct BinDumpWriter<W: Write> {
    inner: W,
    strings: HashMap<String, usize>,
}

impl<W: Write> BinDumpWriter<W> {
    /// Wrap a byte sink.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            strings: HashMap::new(),
        }
    }

    /// Recover the byte sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Raw byte.
    pub fn write_u8(&mut self, v: u8) -> Result<(), DumpError> {
        self.inner.write_all(&[v])?;
        Ok(())
    }

    /// Variable-width signed integer.
    pub fn write_int(&mut self, v: i32) -> Result<(), DumpError> {
        if let Ok(small) = i8::try_from(v) {
            if small != SENTINEL_16 && small != SENTINEL_32 {
                return self.write_u8(small as u8);
            }
        }
        if let Ok(mid) = i16::try_from(v) {
            self.write_u8(SENTINEL_16 as u8)?;
            self.inner.write_all(&mid.to_le_bytes())?;
        } else {
            self.write_u8(SENTINEL_32 as u8)?;
            self.inner.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    /// Non-negative size or index.
    pub fn write_usize(&mut self, v: usize) -> Result<(), DumpError> {
        let v = i32::try_from(v)
            .map_err(|_| DumpError::Malformed(format!("value {} is too large to dump", v)))?;
        self.write_int(v)
    }

    /// Boolean as one byte.
    pub fn write_bool(&mut self, v: bool) -> Result<(), DumpError> {
        self.write_u8(u8::from(v))
    }

    /// IEEE-754 double, little-endian.
    pub fn write_f64(&mut self, v: f64) -> Result<(), DumpError> {
        self.inner.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// String through the first-seen table.
    pub fn write_str(&mut self, s: &str) -> Result<(), DumpError> {
        if let Some(&idx) = self.strings.get(s) {
            return self.write_usize(idx);
        }
        let idx = self.strings.len();
        self.strings.insert(s.to_string(), idx);
        self.write_usize(idx)?;
        self.write_usize(s.len())?;
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }
}

/// Low-level reader for the dump encoding.
pub struct BinDumpReader<R: Read> {
    inner: R,
    strings: Vec<Arc<str>>,
}

impl<R: Read> BinDumpReader<R> {
    /// Wrap a byte source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            strings: Vec::new(),
        }
    }

    /// Raw byte.
    pub fn read_u8(&mut self) -> Result<u8, DumpError> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Variable-width signed integer.
    pub fn read_int(&mut self) -> Result<i32, DumpError> {
        let first = self.read_u8()? as i8;
        match first {
            SENTINEL_16 => {
                let mut buf = [0u8; 2];
                self.inner.read_exact(&mut buf)?;
                Ok(i32::from(i16::from_le_bytes(buf)))
            }
            SENTINEL_32 => {
                let mut buf = [0u8; 4];
                self.inner.read_exact(&mut buf)?;
                Ok(i32::from_le_bytes(buf))
            }
            small => Ok(i32::from(small)),
        }
    }

    /// Non-negative size or index.
    pub fn read_usize(&mut self) -> Result<usize, DumpError> {
        let v = self.read_int()?;
        usize::try_from(v).map_err(|_| DumpError::Malformed(format!("negative size {}", v)))
    }

    /// Boolean.
    pub fn read_bool(&mut self) -> Result<bool, DumpError> {
        Ok(self.read_u8()? != 0)
    }

    /// IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64, DumpError> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// String through the first-seen table.
    pub fn read_str(&mut self) -> Result<Arc<str>, DumpError> {
        let idx = self.read_usize()?;
        if idx < self.strings.len() {
            return Ok(self.strings[idx].clone());
        }
        if idx > self.strings.len() {
            return Err(DumpError::StringMapFailure(idx));
        }

        let len = self.read_usize()?;
        let mut bytes = Vec::with_capacity(bounded_capacity(len));
        (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(DumpError::UnexpectedEof);
        }
        let s: Arc<str> = String::from_utf8(bytes)
            .map_err(|_| DumpError::InvalidUtf8)?
            .into();
        self.strings.push(s.clone());
        Ok(s)
    }
}

/// A dumped function after it was committed to a segment.
#[derive(Debug, Clone)]
pub struct UndumpedFunction {
    /// The committed block
    pub block: CodeBlock,
    /// Address of the function header
    pub entry: usize,
    /// Function name from the header
    pub name: Arc<str>,
    /// Whether the function closes over `_ENV`
    pub has_env: bool,
    /// Source references carried by the dump, in instruction order
    pub refs: Vec<SourceRef>,
}

/// Write the function whose header is at `entry` to `out`.
///
/// `has_env` records whether the closure captures `_ENV`; callers must
/// reject closures with any other capture before dumping.
pub fn dump_function<W: Write>(
    code: &ByteCode,
    entry: usize,
    has_env: bool,
    out: W,
) -> Result<W, DumpError> {
    let block = code
        .block_at(entry)
        .ok_or_else(|| DumpError::Malformed(format!("no code at address {}", entry)))?;
    let length = match block.get(entry).map(|i| &i.opcode) {
        Some(OpCode::Meta { length, .. }) => *length,
        _ => return Err(DumpError::Malformed("function header not found".to_string())),
    };
    let body = block
        .range(entry, length)
        .ok_or_else(|| DumpError::Malformed("function body is truncated".to_string()))?;

    let mut w = BinDumpWriter::new(out);
    for b in DUMP_MAGIC {
        w.write_u8(b)?;
    }
    w.write_u8(DUMP_VERSION)?;
    w.write_bool(has_env)?;
    w.write_usize(length)?;

    for inst in body {
        write_opcode(&mut w, &inst.opcode, entry, length)?;
        write_source_ref(&mut w, inst.source_ref)?;
    }

    Ok(w.into_inner())
}

/// Read a dumped function and commit it to `code`. Source references are
/// rebound to `source_idx`.
pub fn undump_function<R: Read>(
    code: &ByteCode,
    input: R,
    source_idx: usize,
) -> Result<UndumpedFunction, DumpError> {
    let mut r = BinDumpReader::new(input);
    let mut magic = [0u8; 4];
    for b in magic.iter_mut() {
        *b = r.read_u8().map_err(|_| DumpError::BadHeader)?;
    }
    if magic != DUMP_MAGIC {
        return Err(DumpError::BadHeader);
    }
    let version = r.read_u8()?;
    if version != DUMP_VERSION {
        return Err(DumpError::VersionMismatch {
            found: version,
            expected: DUMP_VERSION,
        });
    }
    let has_env = r.read_bool()?;
    let length = r.read_usize()?;

    let mut relative = Vec::with_capacity(bounded_capacity(length));
    for _ in 0..length {
        let opcode = read_opcode(&mut r, length)?;
        let sref = read_source_ref(&mut r, source_idx)?;
        relative.push((opcode, sref));
    }

    let name = match relative.first() {
        Some((OpCode::Meta { name, .. }, _)) => name.clone(),
        _ => return Err(DumpError::Malformed("function header not found".to_string())),
    };
    let refs: Vec<SourceRef> = relative.iter().filter_map(|(_, r)| *r).collect();

    let (block, ()) = code.append_with(|builder| -> Result<(), DumpError> {
        let base = builder.base();
        for (mut opcode, sref) in relative {
            relocate(&mut opcode, base);
            builder.set_source_ref(sref);
            builder.emit(opcode);
        }
        Ok(())
    })?;

    Ok(UndumpedFunction {
        entry: block.base(),
        block,
        name,
        has_env,
        refs,
    })
}

fn relocate(opcode: &mut OpCode, base: usize) {
    if let Some(target) = opcode.jump_target() {
        opcode.set_jump_target(target + base);
    }
    if let OpCode::Closure { entry, .. } = opcode {
        *entry += base;
    }
}

fn relative_address(addr: usize, entry: usize, length: usize) -> Result<usize, DumpError> {
    match addr.checked_sub(entry) {
        Some(rel) if rel <= length => Ok(rel),
        _ => Err(DumpError::Malformed(format!(
            "address {} lies outside the dumped function",
            addr
        ))),
    }
}

fn check_relative(rel: usize, length: usize) -> Result<usize, DumpError> {
    if rel <= length {
        Ok(rel)
    } else {
        Err(DumpError::Malformed(format!(
            "address {} lies outside the dumped function",
            rel
        )))
    }
}

fn write_opcode<W: Write>(
    w: &mut BinDumpWriter<W>,
    opcode: &OpCode,
    entry: usize,
    length: usize,
) -> Result<(), DumpError> {
    match opcode {
        OpCode::Nop => w.write_u8(0)?,
        OpCode::Meta { name, kind, length } => {
            w.write_u8(1)?;
            w.write_str(name)?;
            w.write_u8(match kind {
                MetaKind::Chunk => 0,
                MetaKind::Function => 1,
            })?;
            w.write_usize(*length)?;
        }
        OpCode::BeginFn { locals } => {
            w.write_u8(2)?;
            w.write_usize(locals.len())?;
            for l in locals.iter() {
                w.write_str(l)?;
            }
        }
        OpCode::Args { params, varargs } => {
            w.write_u8(3)?;
            w.write_usize(*params)?;
            w.write_bool(*varargs)?;
        }
        OpCode::Literal(v) => {
            w.write_u8(4)?;
            write_literal(w, v)?;
        }
        OpCode::Pop(n) => {
            w.write_u8(5)?;
            w.write_usize(*n)?;
        }
        OpCode::Copy(n) => {
            w.write_u8(6)?;
            w.write_usize(*n)?;
        }
        OpCode::Load(sym) => {
            w.write_u8(7)?;
            write_symbol(w, sym)?;
        }
        OpCode::Store { symbol, index } => {
            w.write_u8(8)?;
            write_symbol(w, symbol)?;
            w.write_usize(*index)?;
        }
        OpCode::Local { slot, index } => {
            w.write_u8(9)?;
            w.write_usize(*slot)?;
            w.write_usize(*index)?;
        }
        OpCode::Closure { entry: target, captures } => {
            w.write_u8(10)?;
            w.write_usize(relative_address(*target, entry, length)?)?;
            w.write_usize(captures.len())?;
            for c in captures.iter() {
                write_symbol(w, c)?;
            }
        }
        OpCode::VarArgs => w.write_u8(11)?,
        OpCode::Call { argc } => {
            w.write_u8(12)?;
            w.write_usize(*argc)?;
        }
        OpCode::Method { name } => {
            w.write_u8(13)?;
            w.write_str(name)?;
        }
        OpCode::Ret { values } => {
            w.write_u8(14)?;
            w.write_usize(*values)?;
        }
        OpCode::Jump(t) | OpCode::JumpIfFalse(t) | OpCode::JfOrPop(t) | OpCode::JtOrPop(t) => {
            w.write_u8(match opcode {
                OpCode::Jump(_) => 15,
                OpCode::JumpIfFalse(_) => 16,
                OpCode::JfOrPop(_) => 17,
                _ => 18,
            })?;
            w.write_usize(relative_address(*t, entry, length)?)?;
        }
        OpCode::Binary(op) => {
            w.write_u8(19)?;
            let idx = BinaryOp::ALL.iter().position(|o| o == op).unwrap_or(0);
            w.write_usize(idx)?;
        }
        OpCode::Not => w.write_u8(20)?,
        OpCode::Neg => w.write_u8(21)?,
        OpCode::Len => w.write_u8(22)?,
        OpCode::NewTable => w.write_u8(23)?,
        OpCode::TblSet => w.write_u8(24)?,
        OpCode::TblAppend { index, expand } => {
            w.write_u8(25)?;
            w.write_usize(*index)?;
            w.write_bool(*expand)?;
        }
        OpCode::Index => w.write_u8(26)?,
        OpCode::IndexSet { index } => {
            w.write_u8(27)?;
            w.write_usize(*index)?;
        }
        OpCode::MkTuple(n) => {
            w.write_u8(28)?;
            w.write_usize(*n)?;
        }
        OpCode::Scalar => w.write_u8(29)?,
        OpCode::ForPrep => w.write_u8(30)?,
        OpCode::ForLoop { exit } => {
            w.write_u8(31)?;
            w.write_usize(relative_address(*exit, entry, length)?)?;
        }
        OpCode::ForStep => w.write_u8(32)?,
        OpCode::ForVar { slot } => {
            w.write_u8(33)?;
            w.write_usize(*slot)?;
        }
        OpCode::IterPrep => w.write_u8(34)?,
        OpCode::IterCheck { exit } => {
            w.write_u8(35)?;
            w.write_usize(relative_address(*exit, entry, length)?)?;
        }
    }
    Ok(())
}

fn read_opcode<R: Read>(r: &mut BinDumpReader<R>, length: usize) -> Result<OpCode, DumpError> {
    let tag = r.read_u8()?;
    let opcode = match tag {
        0 => OpCode::Nop,
        1 => {
            let name = r.read_str()?;
            let kind = match r.read_u8()? {
                0 => MetaKind::Chunk,
                1 => MetaKind::Function,
                other => return Err(DumpError::InvalidTag(other)),
            };
            OpCode::Meta {
                name,
                kind,
                length: r.read_usize()?,
            }
        }
        2 => {
            let count = r.read_usize()?;
            let mut locals = Vec::with_capacity(bounded_capacity(count));
            for _ in 0..count {
                locals.push(r.read_str()?);
            }
            OpCode::BeginFn {
                locals: locals.into(),
            }
        }
        3 => OpCode::Args {
            params: r.read_usize()?,
            varargs: r.read_bool()?,
        },
        4 => OpCode::Literal(read_literal(r)?),
        5 => OpCode::Pop(r.read_usize()?),
        6 => OpCode::Copy(r.read_usize()?),
        7 => OpCode::Load(read_symbol(r)?),
        8 => OpCode::Store {
            symbol: read_symbol(r)?,
            index: r.read_usize()?,
        },
        9 => OpCode::Local {
            slot: r.read_usize()?,
            index: r.read_usize()?,
        },
        10 => {
            let entry = check_relative(r.read_usize()?, length)?;
            let count = r.read_usize()?;
            let mut captures = Vec::with_capacity(bounded_capacity(count));
            for _ in 0..count {
                captures.push(read_symbol(r)?);
            }
            OpCode::Closure {
                entry,
                captures: captures.into(),
            }
        }
        11 => OpCode::VarArgs,
        12 => OpCode::Call {
            argc: r.read_usize()?,
        },
        13 => OpCode::Method {
            name: r.read_str()?,
        },
        14 => OpCode::Ret {
            values: r.read_usize()?,
        },
        15 => OpCode::Jump(check_relative(r.read_usize()?, length)?),
        16 => OpCode::JumpIfFalse(check_relative(r.read_usize()?, length)?),
        17 => OpCode::JfOrPop(check_relative(r.read_usize()?, length)?),
        18 => OpCode::JtOrPop(check_relative(r.read_usize()?, length)?),
        19 => {
            let idx = r.read_usize()?;
            let op = BinaryOp::ALL
                .get(idx)
                .copied()
                .ok_or(DumpError::InvalidTag(idx as u8))?;
            OpCode::Binary(op)
        }
        20 => OpCode::Not,
        21 => OpCode::Neg,
        22 => OpCode::Len,
        23 => OpCode::NewTable,
        24 => OpCode::TblSet,
        25 => OpCode::TblAppend {
            index: r.read_usize()?,
            expand: r.read_bool()?,
        },
        26 => OpCode::Index,
        27 => OpCode::IndexSet {
            index: r.read_usize()?,
        },
        28 => OpCode::MkTuple(r.read_usize()?),
        29 => OpCode::Scalar,
        30 => OpCode::ForPrep,
        31 => OpCode::ForLoop {
            exit: check_relative(r.read_usize()?, length)?,
        },
        32 => OpCode::ForStep,
        33 => OpCode::ForVar {
            slot: r.read_usize()?,
        },
        34 => OpCode::IterPrep,
        35 => OpCode::IterCheck {
            exit: check_relative(r.read_usize()?, length)?,
        },
        other => return Err(DumpError::InvalidOpcode(other)),
    };
    Ok(opcode)
}

fn write_literal<W: Write>(w: &mut BinDumpWriter<W>, v: &Value) -> Result<(), DumpError> {
    match v {
        Value::Nil => w.write_u8(0),
        Value::Boolean(false) => w.write_u8(1),
        Value::Boolean(true) => w.write_u8(2),
        Value::Number(n) => {
            w.write_u8(3)?;
            w.write_f64(*n)
        }
        Value::String(s) => {
            w.write_u8(4)?;
            w.write_str(s)
        }
        other => Err(DumpError::Malformed(format!(
            "literal of type {} cannot be dumped",
            other.type_name()
        ))),
    }
}

fn read_literal<R: Read>(r: &mut BinDumpReader<R>) -> Result<Value, DumpError> {
    match r.read_u8()? {
        0 => Ok(Value::Nil),
        1 => Ok(Value::Boolean(false)),
        2 => Ok(Value::Boolean(true)),
        3 => Ok(Value::Number(r.read_f64()?)),
        4 => Ok(Value::String(r.read_str()?)),
        other => Err(DumpError::InvalidTag(other)),
    }
}

fn write_symbol<W: Write>(w: &mut BinDumpWriter<W>, sym: &SymbolRef) -> Result<(), DumpError> {
    match sym {
        SymbolRef::Local { name, index } => {
            w.write_u8(0)?;
            w.write_str(name)?;
            w.write_usize(*index)
        }
        SymbolRef::Upvalue { name, index } => {
            w.write_u8(1)?;
            w.write_str(name)?;
            w.write_usize(*index)
        }
        SymbolRef::Global { name, env } => {
            w.write_u8(2)?;
            w.write_str(name)?;
            write_symbol(w, env)
        }
        SymbolRef::DefaultEnv => w.write_u8(3),
    }
}

fn read_symbol<R: Read>(r: &mut BinDumpReader<R>) -> Result<SymbolRef, DumpError> {
    match r.read_u8()? {
        0 => Ok(SymbolRef::Local {
            name: r.read_str()?,
            index: r.read_usize()?,
        }),
        1 => Ok(SymbolRef::Upvalue {
            name: r.read_str()?,
            index: r.read_usize()?,
        }),
        2 => {
            let name = r.read_str()?;
            let env = read_symbol(r)?;
            Ok(SymbolRef::Global {
                name,
                env: Box::new(env),
            })
        }
        3 => Ok(SymbolRef::DefaultEnv),
        other => Err(DumpError::InvalidTag(other)),
    }
}

fn write_source_ref<W: Write>(
    w: &mut BinDumpWriter<W>,
    sref: Option<SourceRef>,
) -> Result<(), DumpError> {
    match sref {
        None => w.write_bool(false),
        Some(s) => {
            w.write_bool(true)?;
            w.write_usize(s.from_line)?;
            w.write_usize(s.from_char)?;
            w.write_usize(s.to_line)?;
            w.write_usize(s.to_char)?;
            w.write_u8(u8::from(s.is_step_stop) | (u8::from(s.cannot_breakpoint) << 1))
        }
    }
}

fn read_source_ref<R: Read>(
    r: &mut BinDumpReader<R>,
    source_idx: usize,
) -> Result<Option<SourceRef>, DumpError> {
    if !r.read_bool()? {
        return Ok(None);
    }
    let from_line = r.read_usize()?;
    let from_char = r.read_usize()?;
    let to_line = r.read_usize()?;
    let to_char = r.read_usize()?;
    let flags = r.read_u8()?;
    let mut sref = SourceRef::new(source_idx, from_line, from_char, to_line, to_char);
    sref.is_step_stop = flags & 1 != 0;
    sref.cannot_breakpoint = flags & 2 != 0;
    Ok(Some(sref))
}
