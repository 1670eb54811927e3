use anyhow::{anyhow, Result};
use std::fs::OpenOptions;
use std::io::Read;
use std::path::PathBuf;

/// Value argument: "-" (stdin), "@path" (file), "hex:..." or a literal string.
pub fn decode_value_arg(arg: &str) -> Result<(Vec<u8>, &'static str)> {
    if arg == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        return Ok((buf, "stdin"));
    }
    if let Some(p) = arg.strip_prefix('@') {
        let path = PathBuf::from(p);
        let mut f = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| anyhow!("open value file {}: {}", path.display(), e))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        return Ok((buf, "file"));
    }
    if let Some(hx) = arg.strip_prefix("hex:") {
        return Ok((decode_hex(hx)?, "hex"));
    }
    Ok((arg.as_bytes().to_vec(), "literal"))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(anyhow!("hex string must have even length"));
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for (i, pair) in bytes.chunks(2).enumerate() {
        let digit = |c: u8, pos: usize| {
            (c as char)
                .to_digit(16)
                .ok_or_else(|| anyhow!("invalid hex at pos {}", pos))
        };
        let h = digit(pair[0], i * 2)?;
        let l = digit(pair[1], i * 2 + 1)?;
        out.push(((h << 4) | l) as u8);
    }
    Ok(out)
}

pub fn display_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("(binary {} B)", bytes.len()),
    }
}

/// 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_value(key: &str, v: &[u8]) {
    println!("FOUND '{}': {} B", key, v.len());
    println!("text: {}", display_text(v));
    println!("hex:  {}", hex_dump(&v[..v.len().min(64)]));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_values() {
        assert_eq!(decode_hex("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
        let (v, src) = decode_value_arg("hex:6869").unwrap();
        assert_eq!((v.as_slice(), src), (&b"hi"[..], "hex"));
        let (v, src) = decode_value_arg("plain").unwrap();
        assert_eq!((v.as_slice(), src), (&b"plain"[..], "literal"));
    }

    #[test]
    fn dump_wraps_lines() {
        let d = hex_dump(&[0u8; 17]);
        assert_eq!(d.lines().count(), 2);
        assert_eq!(display_text(&[0xff, 0xfe]), "(binary 2 B)");
    }
}
