use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::item::{MAX_STRING_LEN, decode_item};
use super::{Item, encode_item};
use crate::SvnInfoError;

type DynRead = Box<dyn AsyncRead + Unpin + Send>;
type DynWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// Upper bound for the bytes buffered while waiting for one item.
const MAX_ITEM_LEN: usize = 4 * MAX_STRING_LEN;

/// A parsed `( success ... )` / `( failure ... )` response.
#[derive(Debug)]
pub(crate) enum Response {
    Success(Vec<Item>),
    Failure(Vec<Item>),
}

/// One side of an agent connection.
pub(crate) struct WireConnection {
    read: DynRead,
    write: DynWrite,
    buf: Vec<u8>,
    write_buf: Vec<u8>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl WireConnection {
    pub(crate) fn new(
        read: DynRead,
        write: DynWrite,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            read,
            write,
            buf: Vec::new(),
            write_buf: Vec::new(),
            read_timeout,
            write_timeout,
        }
    }

    pub(crate) async fn write_item(&mut self, item: &Item) -> Result<(), SvnInfoError> {
        self.write_buf.clear();
        encode_item(item, &mut self.write_buf);
        self.write_buf.push(b'\n');

        let buf = std::mem::take(&mut self.write_buf);
        let result = self.write_wire_bytes(&buf).await;
        self.write_buf = buf;
        result
    }

    async fn write_wire_bytes(&mut self, bytes: &[u8]) -> Result<(), SvnInfoError> {
        tokio::time::timeout(self.write_timeout, write_and_flush(&mut self.write, bytes))
            .await
            .map_err(|_| {
                SvnInfoError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write timed out",
                ))
            })??;
        Ok(())
    }

    pub(crate) async fn write_success(&mut self, params: Vec<Item>) -> Result<(), SvnInfoError> {
        self.write_item(&Item::List(vec![Item::word("success"), Item::List(params)]))
            .await
    }

    pub(crate) async fn write_failure(
        &mut self,
        code: u64,
        message: &str,
        path: &str,
    ) -> Result<(), SvnInfoError> {
        self.write_item(&Item::List(vec![
            Item::word("failure"),
            Item::List(vec![Item::List(vec![
                Item::Number(code),
                Item::string(message),
                Item::string(path),
            ])]),
        ]))
        .await
    }

    pub(crate) async fn read_response(&mut self) -> Result<Response, SvnInfoError> {
        let item = self.read_item().await?;
        let Item::List(parts) = item else {
            return Err(SvnInfoError::Protocol("response not a list".into()));
        };
        let mut parts = parts.into_iter();
        let kind = match parts.next() {
            Some(Item::Word(kind)) => kind,
            Some(_) => return Err(SvnInfoError::Protocol("response kind not a word".into())),
            None => return Err(SvnInfoError::Protocol("empty response".into())),
        };
        let params = match parts.next() {
            Some(Item::List(items)) => items,
            _ => Vec::new(),
        };
        match kind.as_str() {
            "success" => Ok(Response::Success(params)),
            "failure" => Ok(Response::Failure(params)),
            other => Err(SvnInfoError::Protocol(format!(
                "unexpected response kind: {other}"
            ))),
        }
    }

    pub(crate) async fn read_item(&mut self) -> Result<Item, SvnInfoError> {
        let item = tokio::time::timeout(self.read_timeout, self.next_item())
            .await
            .map_err(|_| {
                SvnInfoError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "read timed out",
                ))
            })??;
        item.ok_or_else(|| SvnInfoError::Protocol("connection closed by peer".into()))
    }

    /// Waits without a deadline for the next item; `None` on a clean EOF.
    pub(crate) async fn next_item(&mut self) -> Result<Option<Item>, SvnInfoError> {
        loop {
            if let Some((item, used)) = decode_item(&self.buf)? {
                self.buf.drain(..used);
                return Ok(Some(item));
            }
            if self.buf.len() > MAX_ITEM_LEN {
                return Err(SvnInfoError::Protocol("item exceeds size limit".into()));
            }
            let mut chunk = [0u8; 8192];
            let n = self.read.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    self.buf.clear();
                    return Ok(None);
                }
                return Err(SvnInfoError::Protocol("unexpected EOF".into()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

async fn write_and_flush(write: &mut DynWrite, bytes: &[u8]) -> std::io::Result<()> {
    write.write_all(bytes).await?;
    write.flush().await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::future::Future;

    fn run_async<T>(f: impl Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    async fn connected_pair() -> (WireConnection, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_task = tokio::spawn(async move { listener.accept().await });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server, _) = accept_task.await.unwrap().unwrap();

        let (read, write) = client.into_split();
        let conn = WireConnection::new(
            Box::new(read),
            Box::new(write),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        (conn, server)
    }

    async fn read_after(bytes: &[u8]) -> Result<Item, SvnInfoError> {
        let (mut conn, mut server) = connected_pair().await;
        server.write_all(bytes).await.unwrap();
        server.flush().await.unwrap();
        conn.read_item().await
    }

    #[test]
    fn read_item_decodes_nested_lists() {
        run_async(async {
            let item = read_after(b"( success ( ( 8:REVISION 2:42 ) ) ) \n")
                .await
                .unwrap();
            assert_eq!(
                item,
                Item::List(vec![
                    Item::word("success"),
                    Item::List(vec![Item::List(vec![
                        Item::string("REVISION"),
                        Item::string("42"),
                    ])]),
                ])
            );
        });
    }

    #[test]
    fn read_item_rejects_invalid_word_tokens() {
        run_async(async {
            let err = read_after(b"( wo:rd ) ").await.unwrap_err();
            assert!(matches!(err, SvnInfoError::Protocol(_)));
        });
    }

    #[test]
    fn read_item_rejects_number_overflow() {
        run_async(async {
            let err = read_after(b"99999999999999999999999 ").await.unwrap_err();
            assert!(matches!(err, SvnInfoError::Protocol(_)));
        });
    }

    #[test]
    fn read_item_requires_whitespace_after_strings() {
        run_async(async {
            let err = read_after(b"3:abcX ").await.unwrap_err();
            assert!(matches!(err, SvnInfoError::Protocol(_)));
        });
    }

    #[test]
    fn read_item_rejects_oversized_strings() {
        run_async(async {
            let err = read_after(b"99999999:").await.unwrap_err();
            assert!(matches!(err, SvnInfoError::Protocol(_)));
        });
    }

    #[test]
    fn read_item_times_out_on_partial_input() {
        run_async(async {
            let (mut conn, mut server) = connected_pair().await;
            server.write_all(b"( success ").await.unwrap();
            let err = conn.read_item().await.unwrap_err();
            assert!(
                matches!(err, SvnInfoError::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut)
            );
        });
    }

    #[test]
    fn next_item_reports_clean_eof() {
        run_async(async {
            let (mut conn, mut server) = connected_pair().await;
            server.write_all(b"( svninfo ( 1:a ) ) \n").await.unwrap();
            server.shutdown().await.unwrap();
            drop(server);

            assert!(conn.next_item().await.unwrap().is_some());
            assert!(conn.next_item().await.unwrap().is_none());
        });
    }

    #[test]
    fn failure_response_carries_error_tuple() {
        run_async(async {
            let (mut conn, server) = connected_pair().await;
            let (read, write) = server.into_split();
            let mut peer = WireConnection::new(
                Box::new(read),
                Box::new(write),
                Duration::from_secs(1),
                Duration::from_secs(1),
            );
            peer.write_failure(1, "boom", "/ws").await.unwrap();

            let Response::Failure(errors) = conn.read_response().await.unwrap() else {
                unreachable!("expected failure");
            };
            let tuple = errors[0].as_list().unwrap();
            assert_eq!(tuple[0].as_u64(), Some(1));
            assert_eq!(tuple[1].as_str(), Some("boom"));
            assert_eq!(tuple[2].as_str(), Some("/ws"));
        });
    }

    #[test]
    fn items_split_across_reads_are_reassembled() {
        run_async(async {
            let (mut conn, mut server) = connected_pair().await;
            let writer = tokio::spawn(async move {
                server.write_all(b"( svninfo ( 9:/ws/tr").await.unwrap();
                server.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                server.write_all(b"unk ) ) \n( svninfo ( 0: ) ) \n").await.unwrap();
                server
            });

            let first = conn.read_item().await.unwrap();
            assert_eq!(
                first,
                Item::List(vec![
                    Item::word("svninfo"),
                    Item::List(vec![Item::string("/ws/trunk")]),
                ])
            );
            let second = conn.read_item().await.unwrap();
            assert_eq!(second.as_list().unwrap()[1].as_list().unwrap()[0].as_str(), Some(""));
            drop(writer.await.unwrap());
        });
    }

    #[test]
    fn read_item_reports_closed_connection() {
        run_async(async {
            let (mut conn, server) = connected_pair().await;
            drop(server);
            let err = conn.read_item().await.unwrap_err();
            assert!(matches!(err, SvnInfoError::Protocol(_)));
        });
    }
}
