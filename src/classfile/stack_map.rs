//! `StackMapTable` decoding and encoding.
//!
//! Frames are decoded to absolute code offsets so that the rewriter can
//! move them, then re-encoded with the most compact frame type that fits
//! the new offset deltas.

use super::{ByteReader, put_u16, table_len};
use crate::{Error, Result};

/// Attribute name.
pub const STACK_MAP_TABLE: &str = "StackMapTable";

/// A verification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    /// `Top`
    Top,
    /// `Integer`
    Integer,
    /// `Float`
    Float,
    /// `Double`
    Double,
    /// `Long`
    Long,
    /// `Null`
    Null,
    /// `UninitializedThis`
    UninitializedThis,
    /// An object of the class at this constant pool index.
    Object(u16),
    /// An object created by the `new` at this code offset.
    Uninitialized(u16),
}

impl VerificationType {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.position();
        Ok(match reader.u8()? {
            0 => Self::Top,
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Long,
            5 => Self::Null,
            6 => Self::UninitializedThis,
            7 => Self::Object(reader.u16()?),
            8 => Self::Uninitialized(reader.u16()?),
            other => {
                return Err(Error::class_file(
                    offset,
                    format!("unknown verification type {other}"),
                ));
            }
        })
    }

    fn write(self, out: &mut Vec<u8>) {
        match self {
            Self::Top => out.push(0),
            Self::Integer => out.push(1),
            Self::Float => out.push(2),
            Self::Double => out.push(3),
            Self::Long => out.push(4),
            Self::Null => out.push(5),
            Self::UninitializedThis => out.push(6),
            Self::Object(index) => {
                out.push(7);
                put_u16(out, index);
            }
            Self::Uninitialized(offset) => {
                out.push(8);
                put_u16(out, offset);
            }
        }
    }
}

/// Frame contents relative to the previous frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals, empty stack.
    Same,
    /// Same locals, one stack item.
    SameLocals1(VerificationType),
    /// The last `k` locals removed (1..=3), empty stack.
    Chop(u8),
    /// Locals appended (1..=3), empty stack.
    Append(Vec<VerificationType>),
    /// Explicit locals and stack.
    Full {
        /// Locals.
        locals: Vec<VerificationType>,
        /// Stack.
        stack: Vec<VerificationType>,
    },
}

/// A frame at an absolute code offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Code offset the frame applies to.
    pub offset: usize,
    /// Frame contents.
    pub kind: FrameKind,
}

/// Decodes a `StackMapTable` body.
pub fn decode(info: &[u8]) -> Result<Vec<Frame>> {
    let mut reader = ByteReader::new(info);
    let count = reader.u16()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut previous: Option<usize> = None;

    for _ in 0..count {
        let at = reader.position();
        let frame_type = reader.u8()?;
        let (delta, kind) = match frame_type {
            0..=63 => (u16::from(frame_type), FrameKind::Same),
            64..=127 => (
                u16::from(frame_type - 64),
                FrameKind::SameLocals1(VerificationType::read(&mut reader)?),
            ),
            247 => {
                let delta = reader.u16()?;
                (delta, FrameKind::SameLocals1(VerificationType::read(&mut reader)?))
            }
            248..=250 => (reader.u16()?, FrameKind::Chop(251 - frame_type)),
            251 => (reader.u16()?, FrameKind::Same),
            252..=254 => {
                let delta = reader.u16()?;
                let locals = read_types(&mut reader, usize::from(frame_type - 251))?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = reader.u16()?;
                let n = reader.u16()?;
                let locals = read_types(&mut reader, usize::from(n))?;
                let n = reader.u16()?;
                let stack = read_types(&mut reader, usize::from(n))?;
                (delta, FrameKind::Full { locals, stack })
            }
            reserved => {
                return Err(Error::class_file(
                    at,
                    format!("reserved stack map frame type {reserved}"),
                ));
            }
        };
        let offset = match previous {
            None => usize::from(delta),
            Some(prev) => prev + usize::from(delta) + 1,
        };
        previous = Some(offset);
        frames.push(Frame { offset, kind });
    }
    if reader.remaining() != 0 {
        return Err(Error::class_file(
            reader.position(),
            "trailing bytes in StackMapTable",
        ));
    }
    Ok(frames)
}

/// Encodes frames, which must be in strictly increasing offset order.
pub fn encode(frames: &[Frame]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    put_u16(&mut out, table_len(frames.len(), "stack map frames")?);
    let mut previous: Option<usize> = None;

    for frame in frames {
        let delta = match previous {
            None => Some(frame.offset),
            Some(prev) => frame.offset.checked_sub(prev + 1),
        };
        let delta = delta
            .and_then(|d| u16::try_from(d).ok())
            .ok_or_else(|| {
                Error::class_file(frame.offset, "stack map frames out of order")
            })?;
        previous = Some(frame.offset);

        match &frame.kind {
            FrameKind::Same if delta <= 63 => out.push(delta as u8),
            FrameKind::Same => {
                out.push(251);
                put_u16(&mut out, delta);
            }
            FrameKind::SameLocals1(item) if delta <= 63 => {
                out.push(64 + delta as u8);
                item.write(&mut out);
            }
            FrameKind::SameLocals1(item) => {
                out.push(247);
                put_u16(&mut out, delta);
                item.write(&mut out);
            }
            FrameKind::Chop(k) => {
                out.push(251 - k);
                put_u16(&mut out, delta);
            }
            FrameKind::Append(locals) => {
                out.push(251 + locals.len() as u8);
                put_u16(&mut out, delta);
                write_types(&mut out, locals);
            }
            FrameKind::Full { locals, stack } => {
                out.push(255);
                put_u16(&mut out, delta);
                put_u16(&mut out, table_len(locals.len(), "frame locals")?);
                write_types(&mut out, locals);
                put_u16(&mut out, table_len(stack.len(), "frame stack items")?);
                write_types(&mut out, stack);
            }
        }
    }
    Ok(out)
}

/// Applies `f` to every `Uninitialized` offset in a frame.
pub(crate) fn map_uninitialized(
    frame: &mut Frame,
    mut f: impl FnMut(u16) -> Result<u16>,
) -> Result<()> {
    let mut apply = |ty: &mut VerificationType| -> Result<()> {
        if let VerificationType::Uninitialized(offset) = ty {
            *offset = f(*offset)?;
        }
        Ok(())
    };
    match &mut frame.kind {
        FrameKind::Same | FrameKind::Chop(_) => {}
        FrameKind::SameLocals1(item) => apply(item)?,
        FrameKind::Append(locals) => locals.iter_mut().try_for_each(&mut apply)?,
        FrameKind::Full { locals, stack } => {
            locals.iter_mut().try_for_each(&mut apply)?;
            stack.iter_mut().try_for_each(&mut apply)?;
        }
    }
    Ok(())
}

fn read_types(reader: &mut ByteReader<'_>, n: usize) -> Result<Vec<VerificationType>> {
    (0..n).map(|_| VerificationType::read(reader)).collect()
}

fn write_types(out: &mut Vec<u8>, types: &[VerificationType]) {
    for ty in types {
        ty.write(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_offsets() {
        // same(5), same_locals_1(+2, Integer), full(+300)
        let mut info = vec![0, 3, 5, 66, 1, 255];
        info.extend_from_slice(&300u16.to_be_bytes());
        info.extend_from_slice(&[0, 1, 7, 0, 4, 0, 0]);
        let frames = decode(&info).unwrap();
        let offsets: Vec<_> = frames.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [5, 8, 309]);
        assert_eq!(encode(&frames).unwrap(), info);
    }

    #[test]
    fn test_encode_widens_large_deltas() {
        let frames = [
            Frame {
                offset: 100,
                kind: FrameKind::Same,
            },
            Frame {
                offset: 200,
                kind: FrameKind::SameLocals1(VerificationType::Null),
            },
        ];
        let bytes = encode(&frames).unwrap();
        assert_eq!(bytes, [0, 2, 251, 0, 100, 247, 0, 99, 5]);
        assert_eq!(decode(&bytes).unwrap(), frames);
    }

    #[test]
    fn test_chop_and_append() {
        let frames = [
            Frame {
                offset: 3,
                kind: FrameKind::Append(vec![VerificationType::Integer, VerificationType::Long]),
            },
            Frame {
                offset: 10,
                kind: FrameKind::Chop(2),
            },
        ];
        let bytes = encode(&frames).unwrap();
        assert_eq!(bytes, [0, 2, 253, 0, 3, 1, 4, 249, 0, 6]);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let frames = [
            Frame {
                offset: 4,
                kind: FrameKind::Same,
            },
            Frame {
                offset: 4,
                kind: FrameKind::Same,
            },
        ];
        assert!(encode(&frames).is_err());
    }

    #[test]
    fn test_reserved_frame_type() {
        assert!(decode(&[0, 1, 128]).is_err());
    }

    #[test]
    fn test_map_uninitialized() {
        let mut frame = Frame {
            offset: 0,
            kind: FrameKind::Full {
                locals: vec![VerificationType::UninitializedThis],
                stack: vec![VerificationType::Uninitialized(7), VerificationType::Uninitialized(7)],
            },
        };
        map_uninitialized(&mut frame, |o| Ok(o + 6)).unwrap();
        assert_eq!(
            frame.kind,
            FrameKind::Full {
                locals: vec![VerificationType::UninitializedThis],
                stack: vec![VerificationType::Uninitialized(13), VerificationType::Uninitialized(13)],
            }
        );
    }
}
