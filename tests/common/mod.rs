//! Helpers shared by integration tests

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// Messages received by a stub, one string per message
pub type Received = Arc<Mutex<Vec<String>>>;

/// Port on localhost where nothing is listening
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Minimal SMTP relay accepting every message; returns the port and the DATA payloads
pub fn smtp_stub() -> (u16, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Received::default();
    let log = Arc::clone(&received);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            if let Some(message) = smtp_session(stream) {
                log.lock().unwrap().push(message);
            }
        }
    });

    (port, received)
}

fn smtp_session(stream: TcpStream) -> Option<String> {
    let mut writer = stream.try_clone().ok()?;
    let mut reader = BufReader::new(stream);
    let mut message = None;

    writer.write_all(b"220 stub ESMTP\r\n").ok()?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let command = line.trim_end().to_ascii_uppercase();

        if command.starts_with("EHLO") || command.starts_with("HELO") {
            writer.write_all(b"250 stub\r\n").ok()?;
        } else if command.starts_with("DATA") {
            writer.write_all(b"354 go ahead\r\n").ok()?;
            let mut data = String::new();
            loop {
                let mut data_line = String::new();
                if reader.read_line(&mut data_line).ok()? == 0 {
                    return message;
                }
                if data_line == ".\r\n" {
                    break;
                }
                data.push_str(&data_line);
            }
            message = Some(data);
            writer.write_all(b"250 queued\r\n").ok()?;
        } else if command.starts_with("QUIT") {
            writer.write_all(b"221 bye\r\n").ok()?;
            break;
        } else {
            writer.write_all(b"250 ok\r\n").ok()?;
        }
    }

    message
}
