//! Renders wire RDATA of the opaque record types as presentation text
//! so transferred records are stored the way a zone file import would
//! store them.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use data_encoding::HEXLOWER;

use crate::rr::RecordType;

/// Upper bound on compression pointers followed for one name.
const MAX_POINTERS: usize = 32;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.bytes.len());
        let end = end.ok_or_else(|| "truncated data".to_string())?;
        let bytes = self.bytes;
        self.pos = end;
        let out = &bytes[end - n..end];
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let bytes = self.bytes;
        let out = &bytes[self.pos..];
        self.pos = bytes.len();
        out
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Reads an absolute name. Pointers may only point backwards.
    fn name(&mut self) -> Result<String, String> {
        let mut labels: Vec<String> = Vec::new();
        let mut at = self.pos;
        let mut resume = None;
        let mut hops = 0;
        loop {
            let len = *self.bytes.get(at).ok_or("truncated name")?;
            match len {
                0 => {
                    at += 1;
                    break;
                }
                l if l & 0xc0 == 0xc0 => {
                    let low = *self.bytes.get(at + 1).ok_or("truncated name pointer")?;
                    let target = usize::from(u16::from_be_bytes([l & 0x3f, low]));
                    if target >= at || hops == MAX_POINTERS {
                        return Err("bad name compression pointer".into());
                    }
                    hops += 1;
                    resume.get_or_insert(at + 2);
                    at = target;
                }
                l if l & 0xc0 != 0 => return Err(format!("unsupported label type {l:#04x}")),
                l => {
                    let start = at + 1;
                    let end = start + usize::from(l);
                    let label = self.bytes.get(start..end).ok_or("truncated label")?;
                    labels.push(label.iter().map(|b| escape_name_byte(*b)).collect());
                    at = end;
                }
            }
        }
        self.pos = resume.unwrap_or(at);
        if labels.is_empty() {
            return Ok(".".to_string());
        }
        Ok(format!("{}.", labels.join(".")))
    }

    fn character_string(&mut self) -> Result<String, String> {
        let len = self.u8()?;
        let text = self.take(usize::from(len))?;
        let mut out = String::with_capacity(text.len() + 2);
        out.push('"');
        for b in text {
            match b {
                b'"' | b'\\' => {
                    out.push('\\');
                    out.push(char::from(*b));
                }
                0x20..=0x7e => out.push(char::from(*b)),
                other => out.push_str(&format!("\\{other:03}")),
            }
        }
        out.push('"');
        Ok(out)
    }
}

fn escape_name_byte(b: u8) -> String {
    match b {
        b'.' | b'\\' | b'"' | b';' | b'(' | b')' => format!("\\{}", char::from(b)),
        0x21..=0x7e => char::from(b).to_string(),
        other => format!("\\{other:03}"),
    }
}

fn type_mnemonic(code: u16) -> String {
    match RecordType::from_code(code) {
        Some(rtype) => rtype.to_string(),
        None => format!("TYPE{code}"),
    }
}

fn timestamp(secs: u32) -> Result<String, String> {
    DateTime::from_timestamp(i64::from(secs), 0)
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .ok_or_else(|| format!("bad timestamp {secs}"))
}

fn type_bitmap(cur: &mut Cursor<'_>) -> Result<Vec<String>, String> {
    let mut types = Vec::new();
    while !cur.is_done() {
        let window = u16::from(cur.u8()?);
        let len = cur.u8()?;
        if len == 0 || len > 32 {
            return Err(format!("bad type bitmap length {len}"));
        }
        for (idx, byte) in cur.take(usize::from(len))?.iter().enumerate() {
            for bit in 0..8u16 {
                if byte & (0x80 >> bit) != 0 {
                    let offset = u16::try_from(idx).map_err(|e| e.to_string())? * 8 + bit;
                    types.push(type_mnemonic(window * 256 + offset));
                }
            }
        }
    }
    Ok(types)
}

/// Presentation text for `rdata` of an opaque type. `None` means the
/// type has no rendering and the record should be skipped.
pub(super) fn presentation(rtype: RecordType, rdata: &[u8]) -> Result<Option<String>, String> {
    let mut cur = Cursor::new(rdata);
    let fields: Vec<String> = match rtype {
        RecordType::Spf => {
            let mut strings = Vec::new();
            while !cur.is_done() {
                strings.push(cur.character_string()?);
            }
            strings
        }
        RecordType::Hinfo => vec![cur.character_string()?, cur.character_string()?],
        RecordType::Rp => vec![cur.name()?, cur.name()?],
        RecordType::Afsdb => vec![cur.u16()?.to_string(), cur.name()?],
        RecordType::Naptr => vec![
            cur.u16()?.to_string(),
            cur.u16()?.to_string(),
            cur.character_string()?,
            cur.character_string()?,
            cur.character_string()?,
            cur.name()?,
        ],
        RecordType::Ds => vec![
            cur.u16()?.to_string(),
            cur.u8()?.to_string(),
            cur.u8()?.to_string(),
            HEXLOWER.encode(cur.rest()),
        ],
        RecordType::Sshfp => vec![cur.u8()?.to_string(), cur.u8()?.to_string(), HEXLOWER.encode(cur.rest())],
        RecordType::Dnskey | RecordType::Key => vec![
            cur.u16()?.to_string(),
            cur.u8()?.to_string(),
            cur.u8()?.to_string(),
            STANDARD.encode(cur.rest()),
        ],
        RecordType::Cert => vec![
            cur.u16()?.to_string(),
            cur.u16()?.to_string(),
            cur.u8()?.to_string(),
            STANDARD.encode(cur.rest()),
        ],
        RecordType::Nsec => {
            let mut fields = vec![cur.name()?];
            fields.extend(type_bitmap(&mut cur)?);
            fields
        }
        RecordType::Rrsig => vec![
            type_mnemonic(cur.u16()?),
            cur.u8()?.to_string(),
            cur.u8()?.to_string(),
            cur.u32()?.to_string(),
            timestamp(cur.u32()?)?,
            timestamp(cur.u32()?)?,
            cur.u16()?.to_string(),
            cur.name()?,
            STANDARD.encode(cur.rest()),
        ],
        RecordType::Loc => return Ok(None),
        RecordType::Soa
        | RecordType::Ns
        | RecordType::Mx
        | RecordType::A
        | RecordType::Aaaa
        | RecordType::Cname
        | RecordType::Ptr
        | RecordType::Txt
        | RecordType::Srv => return Err(format!("{rtype} data arrived in an unexpected form")),
    };
    if !cur.is_done() {
        return Err("trailing data".into());
    }
    Ok(Some(fields.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ds_digest_is_hex() {
        let mut rdata = vec![0xec, 0x45, 5, 1];
        rdata.extend(HEXLOWER.decode(b"2bb183af5f22588179a53b0a98631fad1a292118").unwrap());
        assert_eq!(
            presentation(RecordType::Ds, &rdata).unwrap().unwrap(),
            "60485 5 1 2bb183af5f22588179a53b0a98631fad1a292118"
        );
    }

    #[test]
    fn nsec_lists_types_from_the_bitmap() {
        // host.example.com. A MX RRSIG NSEC TYPE1234
        let mut rdata = b"\x04host\x07example\x03com\x00".to_vec();
        rdata.extend([0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03]);
        rdata.extend([0x04, 0x1b]);
        rdata.extend([0u8; 26]);
        rdata.push(0x20);
        assert_eq!(
            presentation(RecordType::Nsec, &rdata).unwrap().unwrap(),
            "host.example.com. A MX RRSIG NSEC TYPE1234"
        );
    }

    #[test]
    fn compressed_names_follow_pointers_backwards() {
        let rdata = b"\x05admin\x07example\x03com\x00\x04info\xc0\x06";
        assert_eq!(
            presentation(RecordType::Rp, rdata).unwrap().unwrap(),
            "admin.example.com. info.example.com."
        );
        assert!(presentation(RecordType::Rp, b"\xc0\x00\x00").is_err());
    }

    #[test]
    fn character_strings_are_quoted_and_escaped() {
        let rdata = b"\x03x86\x0aLinux \"v6\"";
        assert_eq!(
            presentation(RecordType::Hinfo, rdata).unwrap().unwrap(),
            r#""x86" "Linux \"v6\"""#
        );
    }

    #[test]
    fn rrsig_times_are_calendar_stamps() {
        let mut rdata = vec![0x00, 0x01, 8, 2];
        rdata.extend(3600u32.to_be_bytes());
        rdata.extend(1_700_000_000u32.to_be_bytes());
        rdata.extend(1_699_000_000u32.to_be_bytes());
        rdata.extend(12345u16.to_be_bytes());
        rdata.extend(b"\x07example\x03com\x00");
        rdata.extend([1, 2, 3]);
        assert_eq!(
            presentation(RecordType::Rrsig, &rdata).unwrap().unwrap(),
            "A 8 2 3600 20231114221320 20231103082640 12345 example.com. AQID"
        );
    }

    #[test]
    fn truncated_or_padded_data_is_rejected() {
        assert!(presentation(RecordType::Afsdb, &[0x00]).is_err());
        assert!(presentation(RecordType::Afsdb, b"\x00\x01\x00\xff").is_err());
        assert_eq!(presentation(RecordType::Loc, &[0u8; 16]).unwrap(), None);
    }
}
