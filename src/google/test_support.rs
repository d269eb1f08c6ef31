//! 测试用的本地 HTTP 服务（模拟 Google 端点）

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use tiny_http::{Header, Response, Server};

/// 收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: String,
    pub authorization: Option<String>,
}

/// 按顺序回放预设响应的本地服务器，回放完即退出
pub struct MockServer {
    pub base_url: String,
    requests: mpsc::Receiver<RecordedRequest>,
}

impl MockServer {
    pub fn start(responses: Vec<(u16, String)>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok(mut request) = server.recv() else {
                    return;
                };

                let mut request_body = String::new();
                request.as_reader().read_to_string(&mut request_body).ok();

                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());

                tx.send(RecordedRequest {
                    url: request.url().to_string(),
                    body: request_body,
                    authorization,
                })
                .ok();

                let header =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                request.respond(response).ok();
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests: rx,
        }
    }

    /// 取出下一条已记录的请求
    pub fn next_request(&self) -> RecordedRequest {
        self.requests
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
    }
}

/// 发送一个最简单的 GET 请求并返回完整响应文本
pub fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )
    .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).ok();
    response
}

/// 标准的 Token 端点响应
pub fn token_json(access_token: &str, refresh_token: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3599,
    });
    if let Some(refresh) = refresh_token {
        value["refresh_token"] = serde_json::Value::from(refresh);
    }
    value.to_string()
}
