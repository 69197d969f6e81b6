//! Dumps of datagrams the proxy could not make sense of

/// Bytes shown per dump row
const ROW_WIDTH: usize = 16;

/// Hex dump of `data`: offset, hex bytes, then the printable characters.
///
/// ```rust
/// let dump = sipline_core::diagnostics::hex_dump(b"hello\r\n");
/// assert_eq!(dump, "0000  68 65 6c 6c 6f 0d 0a                             hello..");
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    data.chunks(ROW_WIDTH)
        .enumerate()
        .map(|(row, chunk)| {
            let hex = hex::encode(chunk);
            let spaced: Vec<&str> = (0..chunk.len()).map(|i| &hex[i * 2..i * 2 + 2]).collect();
            format!(
                "{:04x}  {:<width$} {}",
                row * ROW_WIDTH,
                spaced.join(" "),
                printable(chunk),
                width = ROW_WIDTH * 3
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn printable(chunk: &[u8]) -> String {
    chunk
        .iter()
        .map(|&b| if b.is_ascii_alphanumeric() { b as char } else { '.' })
        .collect()
}
