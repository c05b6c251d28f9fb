//! Password capture from the inbound terminal
//!
//! The password is typed into the interactive session itself, after the
//! tunnel has been requested, and is forwarded verbatim to the device.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Prompt written before the password is read
pub const PASSWORD_PROMPT: &str = "password: ";

/// Longest password kept; the rest of an overlong line is discarded
const MAX_PASSWORD_LEN: usize = 4096;

/// Write the prompt, read one line and terminate it with a newline
pub async fn prompt_password<S>(stream: &mut S) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = write_flush(stream, PASSWORD_PROMPT.as_bytes()).await {
        tracing::debug!("Failed to write password prompt: {}", e);
    }

    let password = read_password(stream).await;

    if let Err(e) = write_flush(stream, b"\n").await {
        tracing::debug!("Failed to terminate password line: {}", e);
    }

    password
}

/// Read bytes up to the first `\r` and return them trimmed.
///
/// Bytes are consumed one at a time so anything typed after the carriage
/// return stays in the stream for the shell. End of stream returns what was
/// read so far; a read error returns an empty password.
pub async fn read_password<R>(reader: &mut R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        match reader.read_u8().await {
            Ok(b'\r') => break,
            Ok(byte) => {
                if line.len() < MAX_PASSWORD_LEN {
                    line.push(byte);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!("Password read failed: {}", e);
                return String::new();
            }
        }
    }

    String::from_utf8_lossy(&line).trim().to_string()
}

async fn write_flush<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}
