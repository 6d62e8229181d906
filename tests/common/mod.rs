#![allow(dead_code)]

pub mod fixtures {
    pub const SIGNER_KEY: &str = include_str!("../fixtures/signer.key.pem");
    pub const SIGNER_CERT: &str = include_str!("../fixtures/signer.cert.pem");
    pub const SIGNER_PUB: &str = include_str!("../fixtures/signer.pub.pem");
    pub const ROTATED_KEY: &str = include_str!("../fixtures/rotated.key.pem");
    pub const ROTATED_CERT: &str = include_str!("../fixtures/rotated.cert.pem");

    pub const PROJECT: &str = "demo-project";
    pub const ISSUER: &str = "https://securetoken.google.com/demo-project";
}

pub mod tokens {
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::fixtures::{ISSUER, PROJECT};

    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    /// A payload that passes every claim check at `now`.
    pub fn valid_claims(now: i64) -> Value {
        json!({
            "iss": ISSUER,
            "aud": PROJECT,
            "sub": "user-123",
            "iat": now - 10,
            "exp": now + 3600,
            "auth_time": now - 10,
            "email": "player@example.com",
            "email_verified": true,
            "firebase": { "sign_in_provider": "password" }
        })
    }

    /// Sign `claims` with RS256 under `kid`.
    pub fn sign(private_key_pem: &str, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }
}

pub mod certs_server {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};

    /// What the mock endpoint answers with.
    #[derive(Clone)]
    pub struct Reply {
        pub status: u16,
        pub body: String,
        pub cache_control: Option<String>,
        pub delay: Duration,
    }

    impl Reply {
        pub fn keys(keys: &[(&str, &str)]) -> Self {
            let map: HashMap<&str, &str> = keys.iter().copied().collect();
            Self {
                status: 200,
                body: serde_json::to_string(&map).unwrap(),
                cache_control: Some("public, max-age=3600, must-revalidate".to_string()),
                delay: Duration::ZERO,
            }
        }

        pub fn status(status: u16) -> Self {
            Self {
                status,
                body: "{}".to_string(),
                cache_control: None,
                delay: Duration::ZERO,
            }
        }
    }

    /// Certificate endpoint on a random localhost port.
    ///
    /// Requests are served one at a time. Queued replies are used first, in
    /// order, then the standing reply. Dropping it stops the server thread.
    pub struct MockCertsServer {
        pub url: String,
        hits: Arc<AtomicUsize>,
        reply: Arc<Mutex<Reply>>,
        server: Arc<Server>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl MockCertsServer {
        pub fn start(reply: Reply) -> Self {
            Self::start_with_queue(Vec::new(), reply)
        }

        /// Answer the first requests with `first`, then with `then`.
        pub fn start_with_queue(first: Vec<Reply>, then: Reply) -> Self {
            let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
            let port = server.server_addr().to_ip().unwrap().port();
            let url = format!("http://127.0.0.1:{port}/certs");
            let hits = Arc::new(AtomicUsize::new(0));
            let mut queued = VecDeque::from(first);
            let reply = Arc::new(Mutex::new(then));

            let handle = {
                let server = Arc::clone(&server);
                let hits = Arc::clone(&hits);
                let reply = Arc::clone(&reply);
                thread::spawn(move || {
                    for request in server.incoming_requests() {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let next = queued.pop_front();
                        let reply = next.unwrap_or_else(|| reply.lock().unwrap().clone());
                        if !reply.delay.is_zero() {
                            thread::sleep(reply.delay);
                        }
                        let mut response = Response::from_string(reply.body)
                            .with_status_code(reply.status)
                            .with_header(
                                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                                    .unwrap(),
                            );
                        if let Some(cc) = reply.cache_control {
                            response = response.with_header(
                                Header::from_bytes(&b"Cache-Control"[..], cc.as_bytes()).unwrap(),
                            );
                        }
                        let _ = request.respond(response);
                    }
                })
            };

            Self {
                url,
                hits,
                reply,
                server,
                handle: Some(handle),
            }
        }

        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        pub fn set_reply(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }
    }

    impl Drop for MockCertsServer {
        fn drop(&mut self) {
            self.server.unblock();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw request and read the response until the body is complete.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(2000)))
            .unwrap();

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if response_complete(&buf) {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn response_complete(buf: &[u8]) -> bool {
        let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&buf[..pos]);
        let content_length = headers
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= pos + 4 + content_length
    }

    pub fn get(addr: &SocketAddr, path: &str, authorization: Option<&str>) -> String {
        let auth = authorization
            .map(|v| format!("Authorization: {v}\r\n"))
            .unwrap_or_default();
        send_request(
            addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{auth}Connection: close\r\n\r\n"),
        )
    }

    pub fn parse_status(resp: &str) -> u16 {
        resp.lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap_or("0")
            .parse()
            .unwrap()
    }

    pub fn parse_json_body(resp: &str) -> serde_json::Value {
        let body = resp.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
        serde_json::from_str(body).unwrap()
    }
}

pub mod test_server {
    use std::sync::Once;

    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}
