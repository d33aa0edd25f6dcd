//! Minimal DER tag/length/value decoding.
//!
//! Only what the JA4X walk needs: the class, the constructed bit, the tag number
//! and the value bytes of one element. Indefinite lengths are rejected.

use crate::error::Ja4PlusError;
use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult, Parser};

/// Universal tag of an OBJECT IDENTIFIER
pub const TAG_OID: u32 = 6;

const MAX_TAG_BYTES: usize = 4;
const MAX_LENGTH_BYTES: u8 = 4;

/// One decoded ASN.1 element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Tag class, the two high bits of the identifier octet
    pub class: u8,
    pub constructed: bool,
    pub tag: u32,
    pub value: &'a [u8],
}

fn fail(input: &[u8], kind: ErrorKind) -> Err<Error<&[u8]>> {
    Err::Error(Error::new(input, kind))
}

fn parse_tag(input: &[u8]) -> IResult<&[u8], (u8, bool, u32)> {
    let (mut input, first) = be_u8(input)?;
    let class = first >> 6;
    let constructed = first & 0x20 != 0;
    let mut tag = u32::from(first & 0x1f);

    if tag == 0x1f {
        tag = 0;
        let mut read = 0;
        loop {
            let (rest, byte) = be_u8(input)?;
            input = rest;
            read += 1;
            tag = (tag << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                break;
            }
            if read == MAX_TAG_BYTES {
                return Err(fail(input, ErrorKind::TooLarge));
            }
        }
    }

    Ok((input, (class, constructed, tag)))
}

fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (mut input, first) = be_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, usize::from(first)));
    }

    let count = first & 0x7f;
    if count == 0 || count > MAX_LENGTH_BYTES {
        return Err(fail(input, ErrorKind::LengthValue));
    }

    let mut len = 0usize;
    for _ in 0..count {
        let (rest, byte) = be_u8(input)?;
        input = rest;
        len = (len << 8) | usize::from(byte);
    }
    Ok((input, len))
}

/// Decode one element; fails if the header or the value run past the input.
pub fn parse_tlv(input: &[u8]) -> IResult<&[u8], Tlv<'_>> {
    let (input, (class, constructed, tag)) = parse_tag(input)?;
    let (input, len) = parse_length(input)?;
    let (input, value) = take(len).parse(input)?;
    Ok((input, Tlv { class, constructed, tag, value }))
}

/// Decode the next element of `cursor` and advance it past that element.
pub fn next_tlv<'a>(cursor: &mut &'a [u8], context: &'static str) -> Result<Tlv<'a>, Ja4PlusError> {
    let (rest, tlv) = parse_tlv(cursor).map_err(|_| Ja4PlusError::Truncated(context))?;
    *cursor = rest;
    Ok(tlv)
}
