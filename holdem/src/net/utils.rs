use bincode::{ErrorKind, deserialize, serialize};
use serde::{Serialize, de::DeserializeOwned};
use std::io::{self, Read, Write};

/// Largest frame body we'll accept. Requests are tiny and table snapshots
/// for a full ring of seats stay well under this.
pub const MAX_FRAME_LEN: usize = 1 << 20;

fn bincode_to_io(error: Box<ErrorKind>) -> io::Error {
    match *error {
        ErrorKind::Io(error) => error,
        _ => io::ErrorKind::InvalidData.into(),
    }
}

/// Read one frame: a little-endian u32 length followed by that many bytes
/// of bincode.
pub fn read_prefixed<T: DeserializeOwned, R: Read>(reader: &mut R) -> io::Result<T> {
    let mut len_bytes = [0; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::ErrorKind::InvalidData.into());
    }

    // A length prefix without its body showing up right away means the
    // peer isn't speaking our framing, so treat it as bad data rather
    // than something to wait on.
    let mut buf = vec![0; len];
    if let Err(error) = reader.read_exact(&mut buf) {
        let kind = match error.kind() {
            io::ErrorKind::WouldBlock => io::ErrorKind::InvalidData,
            kind => kind,
        };
        return Err(kind.into());
    }
    deserialize(&buf).map_err(bincode_to_io)
}

/// Write one frame. The prefix and body go out in a single write so a
/// reader never sees a prefix without its body.
pub fn write_prefixed<T: Serialize, W: Write>(writer: &mut W, value: &T) -> io::Result<()> {
    let body = serialize(value).map_err(bincode_to_io)?;
    let len = u32::try_from(body.len()).map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend(len.to_le_bytes());
    buf.extend(body);
    writer.write_all(&buf)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use mio::net::{TcpListener, TcpStream};

    use super::{MAX_FRAME_LEN, read_prefixed, write_prefixed};
    use crate::{
        actions::{ActionKind, ActionRequest},
        net::messages::ClientMessage,
    };

    fn setup() -> (TcpStream, TcpStream) {
        let random_port_addr = "127.0.0.1:0".parse().unwrap();
        let server = TcpListener::bind(random_port_addr).unwrap();
        let addr = server.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (stream, _) = server.accept().unwrap();
        (client, stream)
    }

    #[test]
    fn length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, &7u8).unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0, 7]);
        let mut reader = buf.as_slice();
        assert_eq!(read_prefixed::<u8, &[u8]>(&mut reader).unwrap(), 7);
    }

    #[test]
    fn request_frames_survive_a_buffer() {
        let request = ActionRequest::new(ActionKind::Raise, "t1")
            .with_amount(40)
            .with_player_id("alice");
        let msg = ClientMessage(request);
        let mut buf = Vec::new();
        write_prefixed(&mut buf, &msg).unwrap();
        write_prefixed(&mut buf, &msg).unwrap();
        let mut reader = buf.as_slice();
        for _ in 0..2 {
            let read: ClientMessage = read_prefixed(&mut reader).unwrap();
            assert_eq!(read, msg);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn oversized_frames_are_invalid() {
        let mut buf = Vec::from(((MAX_FRAME_LEN + 1) as u32).to_le_bytes());
        buf.extend([0; 8]);
        let mut reader = buf.as_slice();
        assert_eq!(
            read_prefixed::<String, &[u8]>(&mut reader).map_err(|e| e.kind()),
            Err(io::ErrorKind::InvalidData)
        );
    }

    #[test]
    fn write_and_read_invalid_data() {
        let (mut client, mut stream) = setup();

        // Writing a size but not having the data to follow it up
        // results in invalid data.
        assert!(stream.write_all(&1u32.to_le_bytes()).is_ok());
        assert_eq!(
            read_prefixed::<String, TcpStream>(&mut client).map_err(|e| e.kind()),
            Err(io::ErrorKind::InvalidData)
        );
    }

    #[test]
    fn write_and_read_unexpected_eof() {
        let mut buf = Vec::new();
        let value = "flop".to_string();
        write_prefixed(&mut buf, &value).unwrap();
        // Claim a longer body than we actually send.
        buf[0] += 4;
        let mut reader = buf.as_slice();
        assert_eq!(
            read_prefixed::<String, &[u8]>(&mut reader).map_err(|e| e.kind()),
            Err(io::ErrorKind::UnexpectedEof)
        );
    }
}
