//! Composite data: a mixed-type payload described by an in-band format string.
//!
//! On disk a composite item is a tagsegment whose body is a NUL-padded ASCII
//! format string, followed by a bank whose body is the raw data. The format
//! string is compiled to a compact opcode stream (one 16-bit word per op):
//!
//! ```text
//!   bits [15:14]  repeat source: 0 hardcoded, 1 int32, 2 int16, 3 int8
//!   bits [13:8]   hardcoded repeat count (1..63)
//!   bits [7:0]    type code; 0 doubles as '(' (count bits set) and ')' (word == 0)
//! ```
//!
//! Type codes: 1 `i` u32, 2 `F` f32, 3 `a` char, 4 `S` i16, 5 `s` u16,
//! 6 `C` i8, 7 `c` u8, 8 `D` f64, 9 `L` i64, 10 `l` u64, 11 `I` i32,
//! 12 `A` hollerit.
//!
//! Decoding, encoding, and swapping all walk the opcode stream and the data
//! cursor in lockstep. Repeat counts marked `N`/`n`/`m` are read from the
//! data stream as they are reached. When the format is exhausted but data
//! remains, the walk re-enters the format from the beginning (the FORTRAN
//! repeat convention).

use crate::buffer::{ByteBuffer, Endian};
use crate::constants::{
    COMPOSITE_MAX_GROUP_DEPTH, COMPOSITE_MAX_REPEAT, COMPOSITE_MAX_STRING_BYTES,
};
use crate::data_types::DataType;
use crate::header::{StructureHeader, StructureKind};
use crate::util;
use crate::EvioError;

/// One value in a composite payload, in format order.
///
/// Counts read from the data stream (`N`, `n`, `m`) appear as items so a
/// decoded sequence can be re-encoded byte-identically.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeItem {
    Uint32(u32),
    Int32(i32),
    Float32(f32),
    Double64(f64),
    Short16(i16),
    Ushort16(u16),
    Char8(i8),
    Uchar8(u8),
    Long64(i64),
    Ulong64(u64),
    /// 32-bit word holding ASCII, swapped as an int.
    Hollerit(i32),
    /// A string group packed in the canonical string-array form.
    Str(Vec<String>),
    /// `N` repeat count stored as int32.
    N(i32),
    /// `n` repeat count stored as int16.
    NShort(i16),
    /// `m` repeat count stored as int8.
    NByte(i8),
}

// ── Format compilation ──────────────────────────────────────────────

/// Compile a composite format string into its opcode stream.
///
/// Spaces are ignored. Fails with `InvalidFormat` on unmatched parentheses,
/// repeat counts above 63 (use `N`/`n`/`m` instead), string groups above 15
/// bytes, groups nested deeper than 10, and illegal characters.
pub fn compile_format(fmt: &str) -> Result<Vec<u16>, EvioError> {
    let mut opcodes: Vec<u16> = Vec::new();
    // nr: accumulated digit count; -1 marks "count not allowed here"
    let mut nr: i64 = 0;
    // nn == 0 means the next count comes from data, nb is its byte width
    let mut nn: i64 = 1;
    let mut nb: i64 = 0;
    let mut lev: usize = 0;

    for ch in fmt.chars() {
        match ch {
            ' ' => continue,
            '0'..='9' => {
                if nr < 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "unexpected digit '{}' in \"{}\"",
                        ch, fmt
                    )));
                }
                nr = 10 * nr + (ch as i64 - '0' as i64);
                if nr > COMPOSITE_MAX_REPEAT as i64 {
                    return Err(EvioError::InvalidFormat(format!(
                        "repeat count {} above {} in \"{}\", use N/n/m",
                        nr, COMPOSITE_MAX_REPEAT, fmt
                    )));
                }
            }
            '(' => {
                if nr < 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "misplaced '(' in \"{}\"",
                        fmt
                    )));
                }
                lev += 1;
                if lev > COMPOSITE_MAX_GROUP_DEPTH {
                    return Err(EvioError::InvalidFormat(format!(
                        "groups nested deeper than {} in \"{}\"",
                        COMPOSITE_MAX_GROUP_DEPTH, fmt
                    )));
                }
                if nn == 0 {
                    opcodes.push(repeat_source_bits(nb)?);
                } else {
                    opcodes.push(((nn.max(nr) as u16) & 0x3f) << 8);
                }
                nn = 1;
                nb = 0;
                nr = 0;
            }
            ')' => {
                if nr >= 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "misplaced ')' in \"{}\"",
                        fmt
                    )));
                }
                if lev == 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "unmatched ')' in \"{}\"",
                        fmt
                    )));
                }
                lev -= 1;
                opcodes.push(0);
                nr = -1;
            }
            ',' => {
                if nr >= 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "misplaced ',' in \"{}\"",
                        fmt
                    )));
                }
                nr = 0;
            }
            'N' => {
                nn = 0;
                nb = 4;
            }
            'n' => {
                nn = 0;
                nb = 2;
            }
            'm' => {
                nn = 0;
                nb = 1;
            }
            _ => {
                let kf = match ch {
                    'i' => 1,
                    'F' => 2,
                    'a' => 3,
                    'S' => 4,
                    's' => 5,
                    'C' => 6,
                    'c' => 7,
                    'D' => 8,
                    'L' => 9,
                    'l' => 10,
                    'I' => 11,
                    'A' => 12,
                    _ => {
                        return Err(EvioError::InvalidFormat(format!(
                            "illegal character '{}' in \"{}\"",
                            ch, fmt
                        )))
                    }
                };
                if nr < 0 {
                    return Err(EvioError::InvalidFormat(format!(
                        "missing separator before '{}' in \"{}\"",
                        ch, fmt
                    )));
                }
                let count = nn.max(nr);
                if kf == 3 && nn != 0 && count > COMPOSITE_MAX_STRING_BYTES as i64 {
                    return Err(EvioError::InvalidFormat(format!(
                        "string group of {} bytes above {} in \"{}\"",
                        count, COMPOSITE_MAX_STRING_BYTES, fmt
                    )));
                }
                let mut op = (((count as u16) & 0x3f) << 8) | kf as u16;
                if nb > 0 {
                    op |= repeat_source_bits(nb)?;
                }
                opcodes.push(op);
                nn = 1;
                nb = 0;
                nr = -1;
            }
        }
    }

    if lev != 0 {
        return Err(EvioError::InvalidFormat(format!(
            "unmatched '(' in \"{}\"",
            fmt
        )));
    }
    if opcodes.is_empty() {
        return Err(EvioError::InvalidFormat(format!("empty format \"{}\"", fmt)));
    }
    Ok(opcodes)
}

fn repeat_source_bits(nb: i64) -> Result<u16, EvioError> {
    match nb {
        4 => Ok(1 << 14),
        2 => Ok(2 << 14),
        1 => Ok(3 << 14),
        _ => Err(EvioError::InvalidFormat(format!(
            "bad dynamic count width {}",
            nb
        ))),
    }
}

/// Element width in bytes for an opcode type code.
fn code_width(code: u8) -> usize {
    match code {
        8 | 9 | 10 => 8,
        1 | 2 | 11 | 12 => 4,
        4 | 5 => 2,
        _ => 1,
    }
}

// ── Execution driver ────────────────────────────────────────────────

/// Consumer of the lockstep opcode/data walk.
trait FormatSink {
    /// Bytes of data left to process.
    fn remaining(&self) -> usize;
    /// Consume a dynamic repeat count of the given byte width (4, 2, or 1)
    /// from the data stream, returning its value.
    fn consume_count(&mut self, width: usize) -> Result<i64, EvioError>;
    /// Consume `count` elements of the given type code (clamped to what
    /// remains).
    fn consume_data(&mut self, code: u8, count: usize) -> Result<(), EvioError>;
}

struct GroupLevel {
    /// Opcode index (1-based) of the group's '('.
    left: usize,
    nrepeat: i64,
    irepeat: i64,
}

/// Walk the opcode stream against the sink until the data is exhausted.
///
/// This is the single execution loop behind decode and swap; only the sink
/// differs. The control flow mirrors the reference interpreter, including
/// the tail case where a lone trailing op inside the final group repeats
/// until the data runs out.
fn run_format<S: FormatSink>(opcodes: &[u16], sink: &mut S) -> Result<(), EvioError> {
    let nfmt = opcodes.len();
    if nfmt == 0 {
        return Err(EvioError::InvalidFormat("empty opcode stream".into()));
    }

    let mut levels: Vec<GroupLevel> = Vec::with_capacity(COMPOSITE_MAX_GROUP_DEPTH);
    let mut imt = 0usize; // 1-based opcode cursor
    let mut steps = 0u64;
    let step_cap = 64 * (sink.remaining() as u64 + 16) + 1024;

    while sink.remaining() > 0 {
        let mut ncnf: i64;
        let kcnf: u8;
        let mcnf: u8;

        loop {
            steps += 1;
            if steps > step_cap {
                return Err(EvioError::InvalidData(
                    "composite format makes no progress over data".into(),
                ));
            }
            imt += 1;
            if imt > nfmt {
                // end of format: re-enter from the beginning
                imt = 0;
            } else if opcodes[imt - 1] == 0 {
                // right parenthesis
                let lev = levels.len();
                if lev == 0 {
                    return Err(EvioError::InvalidFormat(
                        "right parenthesis without left".into(),
                    ));
                }
                levels[lev - 1].irepeat += 1;
                if levels[lev - 1].irepeat >= levels[lev - 1].nrepeat {
                    levels.pop();
                } else {
                    imt = levels[lev - 1].left;
                }
            } else {
                let op = opcodes[imt - 1];
                let count = ((op >> 8) & 0x3f) as i64;
                let code = (op & 0xff) as u8;
                let source = ((op >> 14) & 0x3) as u8;

                if code == 0 {
                    // left parenthesis: resolve its repeat, then descend
                    let nrepeat = match source {
                        1 => sink.consume_count(4)?,
                        2 => sink.consume_count(2)?,
                        3 => sink.consume_count(1)?,
                        _ => count,
                    };
                    if nrepeat < 0 {
                        return Err(EvioError::InvalidData(format!(
                            "negative group repeat {}",
                            nrepeat
                        )));
                    }
                    if levels.len() >= COMPOSITE_MAX_GROUP_DEPTH {
                        return Err(EvioError::InvalidFormat(format!(
                            "groups nested deeper than {}",
                            COMPOSITE_MAX_GROUP_DEPTH
                        )));
                    }
                    levels.push(GroupLevel {
                        left: imt,
                        nrepeat,
                        irepeat: 0,
                    });
                } else {
                    ncnf = count;
                    kcnf = code;
                    mcnf = source;

                    // a lone op that is both the pre-last format element and
                    // the first after its '(' repeats until the data is gone
                    if !levels.is_empty()
                        && imt == nfmt - 1
                        && imt == levels[levels.len() - 1].left + 1
                    {
                        ncnf = i64::MAX;
                    }
                    break;
                }
            }
        }

        if ncnf == 0 {
            ncnf = match mcnf {
                1 => sink.consume_count(4)?,
                2 => sink.consume_count(2)?,
                3 => sink.consume_count(1)?,
                _ => 0,
            };
            if ncnf < 0 {
                return Err(EvioError::InvalidData(format!(
                    "negative repeat count {}",
                    ncnf
                )));
            }
        }

        let width = code_width(kcnf);
        let fits = (sink.remaining() / width) as i64;
        let count = ncnf.min(fits).max(0) as usize;
        if count > 0 {
            sink.consume_data(kcnf, count)?;
        } else if sink.remaining() < width {
            // trailing bytes smaller than one element: stop cleanly
            break;
        }
    }
    Ok(())
}

// ── Decode sink ─────────────────────────────────────────────────────

struct DecodeSink<'a> {
    data: &'a [u8],
    pos: usize,
    order: Endian,
    items: Vec<CompositeItem>,
}

impl DecodeSink<'_> {
    fn view(&self, len: usize) -> ByteBuffer {
        ByteBuffer::from_slice(&self.data[self.pos..self.pos + len]).with_order(self.order)
    }
}

impl FormatSink for DecodeSink<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn consume_count(&mut self, width: usize) -> Result<i64, EvioError> {
        if self.remaining() < width {
            return Err(EvioError::Truncated(
                "composite data ends inside a repeat count".into(),
            ));
        }
        let mut buf = self.view(width);
        let value = match width {
            4 => {
                let v = buf.get_i32_at(0)?;
                self.items.push(CompositeItem::N(v));
                v as i64
            }
            2 => {
                let v = buf.get_i16_at(0)?;
                self.items.push(CompositeItem::NShort(v));
                v as i64
            }
            _ => {
                let v = buf.get_i8_at(0)?;
                self.items.push(CompositeItem::NByte(v));
                v as i64
            }
        };
        self.pos += width;
        Ok(value)
    }

    fn consume_data(&mut self, code: u8, count: usize) -> Result<(), EvioError> {
        let width = code_width(code);
        if code == 3 {
            // char data is one string-array group of `count` bytes
            let bytes = &self.data[self.pos..self.pos + count];
            self.items
                .push(CompositeItem::Str(util::unpack_strings(bytes)?));
            self.pos += count;
            return Ok(());
        }
        let mut buf = self.view(count * width);
        for i in 0..count {
            let at = i * width;
            let item = match code {
                1 => CompositeItem::Uint32(buf.get_u32_at(at)?),
                2 => CompositeItem::Float32(buf.get_f32_at(at)?),
                4 => CompositeItem::Short16(buf.get_i16_at(at)?),
                5 => CompositeItem::Ushort16(buf.get_u16_at(at)?),
                6 => CompositeItem::Char8(buf.get_i8_at(at)?),
                7 => CompositeItem::Uchar8(buf.get_u8_at(at)?),
                8 => CompositeItem::Double64(buf.get_f64_at(at)?),
                9 => CompositeItem::Long64(buf.get_i64_at(at)?),
                10 => CompositeItem::Ulong64(buf.get_u64_at(at)?),
                11 => CompositeItem::Int32(buf.get_i32_at(at)?),
                12 => CompositeItem::Hollerit(buf.get_i32_at(at)?),
                other => return Err(EvioError::InvalidType(other as u32)),
            };
            self.items.push(item);
        }
        self.pos += count * width;
        Ok(())
    }
}

/// Decode packed composite data bytes (pad already removed) into items.
pub fn decode_items(
    data: &[u8],
    order: Endian,
    opcodes: &[u16],
) -> Result<Vec<CompositeItem>, EvioError> {
    let mut sink = DecodeSink {
        data,
        pos: 0,
        order,
        items: Vec::new(),
    };
    run_format(opcodes, &mut sink)?;
    Ok(sink.items)
}

// ── Swap sink ───────────────────────────────────────────────────────

struct SwapSink<'a> {
    src: &'a ByteBuffer,
    src_at: usize,
    dst: &'a mut ByteBuffer,
    dst_at: usize,
    pos: usize,
    len: usize,
}

impl SwapSink<'_> {
    /// Move `len` bytes with each `width`-sized group byte-reversed.
    fn swap_region(&mut self, len: usize, width: usize) -> Result<(), EvioError> {
        let mut bytes = self.src.vec_at(self.src_at + self.pos, len)?;
        if width > 1 {
            for chunk in bytes.chunks_exact_mut(width) {
                chunk.reverse();
            }
        }
        self.dst.put_bytes_at(self.dst_at + self.pos, &bytes)?;
        self.pos += len;
        Ok(())
    }
}

impl FormatSink for SwapSink<'_> {
    fn remaining(&self) -> usize {
        self.len - self.pos
    }

    fn consume_count(&mut self, width: usize) -> Result<i64, EvioError> {
        if self.remaining() < width {
            return Err(EvioError::Truncated(
                "composite data ends inside a repeat count".into(),
            ));
        }
        // the pre-swap value drives the walk; the swapped bytes land in dst
        let value = match width {
            4 => self.src.get_i32_at(self.src_at + self.pos)? as i64,
            2 => self.src.get_i16_at(self.src_at + self.pos)? as i64,
            _ => self.src.get_i8_at(self.src_at + self.pos)? as i64,
        };
        self.swap_region(width, width)?;
        Ok(value)
    }

    fn consume_data(&mut self, code: u8, count: usize) -> Result<(), EvioError> {
        let width = code_width(code);
        self.swap_region(count * width, width)
    }
}

// ── Composite value ─────────────────────────────────────────────────

/// One composite payload: a format string plus its typed item sequence.
///
/// The items are authoritative; packed bytes are produced on demand in any
/// byte order, so a value parsed from a big-endian buffer re-serializes
/// byte-identically in big-endian and correctly swapped in little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeData {
    format: String,
    opcodes: Vec<u16>,
    /// Tag of the format-carrying tagsegment.
    pub format_tag: u16,
    /// Tag of the data-carrying bank.
    pub data_tag: u16,
    /// Num of the data-carrying bank.
    pub data_num: u8,
    items: Vec<CompositeItem>,
}

impl CompositeData {
    /// Build a composite value, verifying that `items` matches `format`.
    ///
    /// Verification packs the items and decodes them back through the
    /// compiled format; any divergence (wrong type at a position, wrong
    /// count for an `N`/`n`/`m` group) fails with `InvalidData`.
    pub fn build(
        format: &str,
        format_tag: u16,
        data_tag: u16,
        data_num: u8,
        items: Vec<CompositeItem>,
    ) -> Result<Self, EvioError> {
        let opcodes = compile_format(format)?;
        let packed = pack_items(&items, Endian::Big)?;
        let decoded = decode_items(&packed, Endian::Big, &opcodes)?;
        if decoded != items {
            return Err(EvioError::InvalidData(format!(
                "item sequence does not match format \"{}\"",
                format
            )));
        }
        Ok(CompositeData {
            format: format.to_string(),
            opcodes,
            format_tag,
            data_tag,
            data_num,
            items,
        })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn items(&self) -> &[CompositeItem] {
        &self.items
    }

    pub fn opcodes(&self) -> &[u16] {
        &self.opcodes
    }

    fn packed_format(&self) -> Vec<u8> {
        util::pack_strings(&[self.format.clone()])
    }

    fn data_len(&self) -> usize {
        self.items.iter().map(item_bytes).sum()
    }

    /// Total serialized size in bytes: tagsegment + format + bank header +
    /// padded data.
    pub fn packed_bytes(&self) -> usize {
        4 + self.packed_format().len() + 8 + util::padded_length(self.data_len())
    }

    /// Serialize in the given byte order.
    pub fn to_bytes(&self, order: Endian) -> Result<Vec<u8>, EvioError> {
        let fmt_bytes = self.packed_format();
        let data_len = self.data_len();
        let pad = util::padding(data_len);
        let total = self.packed_bytes();
        let mut buf = ByteBuffer::new(total).with_order(order);

        let mut tagseg = StructureHeader::tag_segment(self.format_tag, DataType::CharStar8);
        tagseg.set_data_words((fmt_bytes.len() / 4) as u32);
        tagseg.encode(&mut buf, 0)?;
        buf.put_bytes_at(4, &fmt_bytes)?;

        let bank_at = 4 + fmt_bytes.len();
        let mut bank = StructureHeader::bank(self.data_tag, DataType::Composite, self.data_num);
        bank.pad = pad as u8;
        bank.set_data_words(util::words(data_len) as u32);
        bank.encode(&mut buf, bank_at)?;

        let data = pack_items(&self.items, order)?;
        buf.put_bytes_at(bank_at + 8, &data)?;
        // pad bytes stay zero from allocation
        Ok(buf.vec_at(0, total)?)
    }

    /// Parse one composite value at `at`, returning it and its total size.
    pub fn parse(bytes: &[u8], at: usize, order: Endian) -> Result<(Self, usize), EvioError> {
        let buf = ByteBuffer::from_slice(bytes).with_order(order);

        let tagseg = StructureHeader::decode(&buf, at, StructureKind::TagSegment)?;
        let fmt_len = tagseg.data_words() as usize * 4;
        let fmt_bytes = buf.vec_at(at + 4, fmt_len)?;
        let strings = util::unpack_strings(&fmt_bytes)?;
        let format = strings.into_iter().next().ok_or_else(|| {
            EvioError::InvalidFormat("composite tagsegment holds no format string".into())
        })?;
        let opcodes = compile_format(&format)?;

        let bank_at = at + 4 + fmt_len;
        let bank = StructureHeader::decode(&buf, bank_at, StructureKind::Bank)?;
        let data_at = bank_at + 8;
        let data_total = bank.data_words() as usize * 4;
        let data = buf.vec_at(data_at, data_total - bank.pad as usize)?;

        let items = decode_items(&data, order, &opcodes)?;
        let total = 4 + fmt_len + 8 + data_total;
        Ok((
            CompositeData {
                format,
                opcodes,
                format_tag: tagseg.tag,
                data_tag: bank.tag,
                data_num: bank.num,
                items,
            },
            total,
        ))
    }

    /// Parse a sequence of composite values packed back to back.
    pub fn parse_all(bytes: &[u8], order: Endian) -> Result<Vec<CompositeData>, EvioError> {
        let mut out = Vec::new();
        let mut at = 0usize;
        while at + 12 <= bytes.len() {
            let (cd, used) = CompositeData::parse(bytes, at, order)?;
            out.push(cd);
            at += used;
        }
        Ok(out)
    }
}

fn item_bytes(item: &CompositeItem) -> usize {
    match item {
        CompositeItem::Uint32(_)
        | CompositeItem::Int32(_)
        | CompositeItem::Float32(_)
        | CompositeItem::Hollerit(_)
        | CompositeItem::N(_) => 4,
        CompositeItem::Double64(_) | CompositeItem::Long64(_) | CompositeItem::Ulong64(_) => 8,
        CompositeItem::Short16(_) | CompositeItem::Ushort16(_) | CompositeItem::NShort(_) => 2,
        CompositeItem::Char8(_) | CompositeItem::Uchar8(_) | CompositeItem::NByte(_) => 1,
        CompositeItem::Str(strings) => util::pack_strings(strings).len(),
    }
}

/// Pack items to bytes in the given order, with no trailing pad.
fn pack_items(items: &[CompositeItem], order: Endian) -> Result<Vec<u8>, EvioError> {
    let total: usize = items.iter().map(item_bytes).sum();
    let mut buf = ByteBuffer::new(total).with_order(order);
    for item in items {
        match item {
            CompositeItem::Uint32(v) => buf.put_u32(*v)?,
            CompositeItem::Int32(v) => buf.put_i32(*v)?,
            CompositeItem::Float32(v) => buf.put_f32(*v)?,
            CompositeItem::Double64(v) => buf.put_f64(*v)?,
            CompositeItem::Short16(v) => buf.put_i16(*v)?,
            CompositeItem::Ushort16(v) => buf.put_u16(*v)?,
            CompositeItem::Char8(v) => buf.put_i8(*v)?,
            CompositeItem::Uchar8(v) => buf.put_u8(*v)?,
            CompositeItem::Long64(v) => buf.put_i64(*v)?,
            CompositeItem::Ulong64(v) => buf.put_u64(*v)?,
            CompositeItem::Hollerit(v) => buf.put_i32(*v)?,
            CompositeItem::N(v) => buf.put_i32(*v)?,
            CompositeItem::NShort(v) => buf.put_i16(*v)?,
            CompositeItem::NByte(v) => buf.put_i8(*v)?,
            CompositeItem::Str(strings) => buf.put_bytes(&util::pack_strings(strings))?,
        }
    }
    Ok(buf.vec_at(0, total)?)
}

// ── Swapping ────────────────────────────────────────────────────────

/// Swap `byte_len` bytes of composite payload (one or more back-to-back
/// composite values) from `src` at `at` into `dst` at `dst_at`.
///
/// `src` keeps the source byte order; `dst` receives the opposite. In-place
/// swapping passes a duplicate view of the same storage as `dst`; every
/// region is read before it is rewritten, and dynamic repeat counts are
/// taken from the pre-swap bytes.
pub fn swap_composite(
    src: &ByteBuffer,
    at: usize,
    byte_len: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<(), EvioError> {
    let mut off = 0usize;
    while off + 12 <= byte_len {
        // tagsegment header: decode in source order, emit byte-reversed
        let tagseg = StructureHeader::decode(src, at + off, StructureKind::TagSegment)?;
        swap_words(src, at + off, 4, dst, dst_at + off)?;
        let fmt_len = tagseg.data_words() as usize * 4;

        // the format string is 8-bit data: copied, never swapped
        let fmt_bytes = src.vec_at(at + off + 4, fmt_len)?;
        let strings = util::unpack_strings(&fmt_bytes)?;
        let format = strings.into_iter().next().ok_or_else(|| {
            EvioError::InvalidFormat("composite tagsegment holds no format string".into())
        })?;
        let opcodes = compile_format(&format)?;
        dst.put_bytes_at(dst_at + off + 4, &fmt_bytes)?;

        // data bank header
        let bank_at = at + off + 4 + fmt_len;
        let bank = StructureHeader::decode(src, bank_at, StructureKind::Bank)?;
        swap_words(src, bank_at, 8, dst, dst_at + off + 4 + fmt_len)?;

        let data_off = off + 4 + fmt_len + 8;
        let data_total = bank.data_words() as usize * 4;
        if data_off + data_total > byte_len {
            return Err(EvioError::InvalidLength(format!(
                "composite data of {} bytes overruns payload of {}",
                data_total, byte_len
            )));
        }
        let valid = data_total - bank.pad as usize;

        let mut sink = SwapSink {
            src,
            src_at: at + data_off,
            dst: &mut *dst,
            dst_at: dst_at + data_off,
            pos: 0,
            len: valid,
        };
        run_format(&opcodes, &mut sink)?;

        // carry the pad bytes across untouched
        if bank.pad > 0 {
            let pad = src.vec_at(at + data_off + valid, bank.pad as usize)?;
            dst.put_bytes_at(dst_at + data_off + valid, &pad)?;
        }

        off = data_off + data_total;
    }
    // anything too small to be another composite value crosses unchanged
    if off < byte_len {
        let tail = src.vec_at(at + off, byte_len - off)?;
        dst.put_bytes_at(dst_at + off, &tail)?;
    }
    Ok(())
}

/// Byte-reverse each 32-bit word of a region from `src` into `dst`.
fn swap_words(
    src: &ByteBuffer,
    at: usize,
    len: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<(), EvioError> {
    let mut bytes = src.vec_at(at, len)?;
    for chunk in bytes.chunks_exact_mut(4) {
        chunk.reverse();
    }
    dst.put_bytes_at(dst_at, &bytes)
}
