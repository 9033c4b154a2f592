//! RouterOS API wire framing: variable-width word lengths, word and
//! sentence read/write over any `AsyncRead`/`AsyncWrite` stream.
//!
//! See §4.1: a *sentence* is a sequence of *words* terminated by a
//! zero-length word; a *word* is `<length><bytes>`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RouterClientError;

/// Encodes `len` using the RouterOS variable-width scheme (§4.1's table).
pub fn encode_length(len: u32) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        let len = len | 0x8000;
        vec![(len >> 8) as u8, len as u8]
    } else if len < 0x200000 {
        let len = len | 0xC00000;
        vec![(len >> 16) as u8, (len >> 8) as u8, len as u8]
    } else if len < 0x10000000 {
        let len = len | 0xE0000000;
        vec![
            (len >> 24) as u8,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    } else {
        vec![
            0xF0,
            (len >> 24) as u8,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }
}

/// Decodes a length from an in-memory buffer that already holds the full
/// encoded value. Returns the decoded value and how many bytes it
/// consumed. Used by the round-trip tests; the live client decodes
/// byte-by-byte off the socket instead (see [`read_word`]).
pub fn decode_length(bytes: &[u8]) -> Result<(u32, usize), RouterClientError> {
    let b0 = *bytes
        .first()
        .ok_or_else(|| RouterClientError::Protocol("empty length prefix".into()))?;

    let need = |n: usize| -> Result<(), RouterClientError> {
        if bytes.len() < n {
            Err(RouterClientError::Protocol("truncated length prefix".into()))
        } else {
            Ok(())
        }
    };

    if b0 < 0x80 {
        Ok((b0 as u32, 1))
    } else if b0 < 0xC0 {
        need(2)?;
        Ok((((b0 as u32 & 0x3F) << 8) | bytes[1] as u32, 2))
    } else if b0 < 0xE0 {
        need(3)?;
        Ok((
            ((b0 as u32 & 0x1F) << 16) | (bytes[1] as u32) << 8 | bytes[2] as u32,
            3,
        ))
    } else if b0 < 0xF0 {
        need(4)?;
        Ok((
            ((b0 as u32 & 0x0F) << 24)
                | (bytes[1] as u32) << 16
                | (bytes[2] as u32) << 8
                | bytes[3] as u32,
            4,
        ))
    } else if b0 == 0xF0 {
        need(5)?;
        Ok((
            (bytes[1] as u32) << 24 | (bytes[2] as u32) << 16 | (bytes[3] as u32) << 8 | bytes[4] as u32,
            5,
        ))
    } else {
        Err(RouterClientError::Protocol(format!(
            "invalid length prefix first byte: {b0:#x}"
        )))
    }
}

pub async fn write_word<W: AsyncWrite + Unpin>(
    stream: &mut W,
    word: &str,
) -> Result<(), RouterClientError> {
    let bytes = word.as_bytes();
    stream.write_all(&encode_length(bytes.len() as u32)).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

/// Writes every word in `words` followed by the empty terminator word.
pub async fn write_sentence<W: AsyncWrite + Unpin>(
    stream: &mut W,
    words: &[String],
) -> Result<(), RouterClientError> {
    for word in words {
        write_word(stream, word).await?;
    }
    write_word(stream, "").await?;
    stream.flush().await?;
    Ok(())
}

async fn read_length<R: AsyncRead + Unpin>(stream: &mut R) -> Result<u32, RouterClientError> {
    let mut b0 = [0u8; 1];
    stream.read_exact(&mut b0).await?;
    let b0 = b0[0];

    if b0 < 0x80 {
        Ok(b0 as u32)
    } else if b0 < 0xC0 {
        let mut rest = [0u8; 1];
        stream.read_exact(&mut rest).await?;
        Ok(((b0 as u32 & 0x3F) << 8) | rest[0] as u32)
    } else if b0 < 0xE0 {
        let mut rest = [0u8; 2];
        stream.read_exact(&mut rest).await?;
        Ok(((b0 as u32 & 0x1F) << 16) | (rest[0] as u32) << 8 | rest[1] as u32)
    } else if b0 < 0xF0 {
        let mut rest = [0u8; 3];
        stream.read_exact(&mut rest).await?;
        Ok(((b0 as u32 & 0x0F) << 24)
            | (rest[0] as u32) << 16
            | (rest[1] as u32) << 8
            | rest[2] as u32)
    } else if b0 == 0xF0 {
        let mut rest = [0u8; 4];
        stream.read_exact(&mut rest).await?;
        Ok((rest[0] as u32) << 24 | (rest[1] as u32) << 16 | (rest[2] as u32) << 8 | rest[3] as u32)
    } else {
        Err(RouterClientError::Protocol(format!(
            "invalid length prefix first byte: {b0:#x}"
        )))
    }
}

pub async fn read_word<R: AsyncRead + Unpin>(stream: &mut R) -> Result<String, RouterClientError> {
    let len = read_length(stream).await? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| RouterClientError::Protocol(e.to_string()))
}

/// Reads words until the empty terminator, returning the non-empty ones.
pub async fn read_sentence<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<Vec<String>, RouterClientError> {
    let mut words = Vec::new();
    loop {
        let word = read_word(stream).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_round_trips_at_every_boundary() {
        let cases = [
            0u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFFFF, 0x200000, 0x0FFFFFFF, 0x10000000,
            0xFFFFFFFF,
        ];
        let expected_bytes = [1, 1, 2, 2, 3, 3, 4, 4, 5, 5];
        for (n, expected) in cases.iter().zip(expected_bytes) {
            let encoded = encode_length(*n);
            assert_eq!(encoded.len(), expected, "byte count for {n:#x}");
            let (decoded, consumed) = decode_length(&encoded).unwrap();
            assert_eq!(decoded, *n);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[tokio::test]
    async fn word_round_trips_through_an_in_memory_pipe() {
        let mut buf = Vec::new();
        write_word(&mut buf, "=name=admin").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let word = read_word(&mut cursor).await.unwrap();
        assert_eq!(word, "=name=admin");
    }

    #[tokio::test]
    async fn sentence_round_trips_with_terminator() {
        let mut buf = Vec::new();
        write_sentence(&mut buf, &["/login".to_string(), "=name=admin".to_string()])
            .await
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let words = read_sentence(&mut cursor).await.unwrap();
        assert_eq!(words, vec!["/login", "=name=admin"]);
    }
}
