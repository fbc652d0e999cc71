use milter::{
    Action, Actions, Error, Family, Headers, Milter, Modifier, Observer, Packet, Protocol,
    Response, Result, SessionBuilder, ACCEPT, CONTINUE, DEFAULT_MAX_PACKET_SIZE, REJECT,
};
use pretty_assertions::assert_eq;
use std::io::{self, Cursor, Read, Write};

#[test]
fn negotiation() {
    let input = packets(&[
        (b'O', vec![0, 0, 0, 6, 0, 0, 0, 0x1f, 0, 0, 0, 0x7f]),
        (b'Q', vec![]),
    ]);
    let (output, recorder, _) = run(input, Recording::default(), |_| ());
    assert_eq!(
        output,
        vec![Packet::new(b'O', vec![0, 0, 0, 2, 0, 0, 0, 0x05, 0, 0, 0, 0x02])]
    );
    assert_eq!(recorder.events, vec!["closed"]);
}

#[test]
fn connect_and_helo() {
    let mut connect = cstrings(&["mail.example.org"]);
    connect.push(b'6');
    connect.extend_from_slice(&25u16.to_be_bytes());
    connect.extend(cstrings(&["2001:db8::1"]));
    let input = packets(&[(b'C', connect), (b'H', cstrings(&["mail"]))]);
    let (output, recorder, milter) = run(input, Recording::default(), |_| ());
    assert_eq!(
        milter.calls,
        vec![
            "connect mail.example.org tcp6 [2001:db8::1]:25",
            "helo mail"
        ]
    );
    assert_eq!(codes(&output), b"cc");
    // A clean end of stream is not an error
    assert_eq!(recorder.events, vec!["closed"]);
}

#[test]
fn headers_at_end_of_headers() {
    let input = packets(&[
        (b'L', cstrings(&["Received", "from a"])),
        (b'L', cstrings(&["Subject", "Hi"])),
        (b'L', cstrings(&["Received", "from b"])),
        (b'N', vec![]),
    ]);
    let (output, _, milter) = run(input, Recording::default(), |_| ());
    assert_eq!(
        milter.end_of_headers,
        vec![
            ("Received".to_owned(), "from a".to_owned()),
            ("Subject".to_owned(), "Hi".to_owned()),
            ("Received".to_owned(), "from b".to_owned()),
        ]
    );
    assert_eq!(codes(&output), b"cccc");
}

#[test]
fn abort_resets_message() {
    let mut stream = Duplex::new(Vec::new());
    let mut session =
        SessionBuilder::new(Actions::empty(), Protocol::empty()).build(&mut stream, Quiet);
    let macros = [&b"M"[..], &cstrings(&["i", "4Bx1"])[..]].concat();
    assert_eq!(
        session.process(&Packet::new(b'D', macros)).unwrap(),
        Action::NoReply
    );
    let header = Packet::new(b'L', cstrings(&["Subject", "Hi"]));
    assert_eq!(
        session.process(&header).unwrap(),
        Action::Reply(CONTINUE)
    );
    session.process(&Packet::new(b'B', &b"Hello\r\n"[..])).unwrap();
    assert_eq!(session.headers().len(), 1);
    assert_eq!(session.body(), b"Hello\r\n");
    assert_eq!(session.macros().len(), 1);

    assert_eq!(
        session.process(&Packet::new(b'A', vec![])).unwrap(),
        Action::NoReply
    );
    assert!(session.headers().is_empty());
    assert!(session.body().is_empty());
    assert!(session.macros().is_empty());
}

#[test]
fn body_reset_after_end_of_body() {
    let mut stream = Duplex::new(Vec::new());
    let mut session =
        SessionBuilder::new(Actions::empty(), Protocol::empty()).build(&mut stream, Quiet);
    session.process(&Packet::new(b'B', &b"one "[..])).unwrap();
    session.process(&Packet::new(b'B', &b"two"[..])).unwrap();
    assert_eq!(session.body(), b"one two");
    assert_eq!(
        session.process(&Packet::new(b'E', vec![])).unwrap(),
        Action::Reply(CONTINUE)
    );
    assert!(session.body().is_empty());
    assert!(session.headers().is_empty());
}

#[test]
fn odd_macro_list() {
    let mut stream = Duplex::new(Vec::new());
    let mut session =
        SessionBuilder::new(Actions::empty(), Protocol::empty()).build(&mut stream, Quiet);
    let payload = [&b"C"[..], &cstrings(&["j", "mx", "{if_addr}"])[..]].concat();
    session.process(&Packet::new(b'D', payload)).unwrap();
    assert_eq!(session.macros().len(), 1);
    assert_eq!(session.macros().get("j").map(String::as_str), Some("mx"));
}

#[test]
fn unknown_command_closes() {
    let input = packets(&[(b'Z', vec![1, 2, 3]), (b'H', cstrings(&["late"]))]);
    let (output, recorder, milter) = run(input, Recording::default(), |_| ());
    assert!(output.is_empty());
    assert!(milter.calls.is_empty());
    assert_eq!(recorder.events, vec!["unknown Z", "closed"]);
}

#[test]
fn quit_closes_without_reply() {
    let input = packets(&[(b'Q', vec![]), (b'H', cstrings(&["late"]))]);
    let (output, recorder, milter) = run(input, Recording::default(), |_| ());
    assert!(output.is_empty());
    assert!(milter.calls.is_empty());
    assert_eq!(recorder.events, vec!["closed"]);
}

#[test]
fn terminal_response_ends_session() {
    let milter = Recording {
        reject_mail: true,
        ..Default::default()
    };
    let input = packets(&[
        (b'M', cstrings(&["<spam@example.com>", "SIZE=100"])),
        (b'R', cstrings(&["<user@example.org>"])),
    ]);
    let (output, recorder, milter) = run(input, milter, |_| ());
    assert_eq!(milter.calls, vec!["mail spam@example.com"]);
    assert_eq!(codes(&output), b"r");
    assert_eq!(recorder.events, vec!["closed"]);
}

#[test]
fn custom_reply_continues() {
    let milter = Recording {
        reply_rcpt: true,
        ..Default::default()
    };
    let input = packets(&[
        (b'R', cstrings(&["<a@example.org>"])),
        (b'R', cstrings(&["<b@example.org>"])),
    ]);
    let (output, _, milter) = run(input, milter, |_| ());
    assert_eq!(milter.calls, vec!["rcpt a@example.org", "rcpt b@example.org"]);
    assert_eq!(codes(&output), b"yy");
    assert_eq!(output[0].payload, b"550 5.1.1 No such user\0".to_vec());
}

#[test]
fn filter_error_reported() {
    let milter = Recording {
        fail_helo: true,
        ..Default::default()
    };
    let input = packets(&[(b'H', cstrings(&["bad"])), (b'Q', vec![])]);
    let (output, recorder, _) = run(input, milter, |_| ());
    assert!(output.is_empty());
    assert_eq!(recorder.events, vec!["process_failed", "closed"]);
    assert!(recorder.errors[0].contains("helo refused"));
}

#[test]
fn malformed_command_reported() {
    // A header without a value
    let input = packets(&[(b'L', b"Subject\0Hi".to_vec())]);
    let (output, recorder, milter) = run(input, Recording::default(), |_| ());
    assert!(output.is_empty());
    assert!(milter.calls.is_empty());
    assert_eq!(recorder.events, vec!["process_failed", "closed"]);
}

#[test]
fn truncated_packet_reported() {
    let mut input = packets(&[(b'H', cstrings(&["mail"]))]);
    input.extend_from_slice(&[0, 0, 0, 20, b'H', b'x']);
    let (output, recorder, milter) = run(input, Recording::default(), |_| ());
    assert_eq!(milter.calls, vec!["helo mail"]);
    assert_eq!(codes(&output), b"c");
    assert_eq!(recorder.events, vec!["read_failed", "closed"]);
}

#[test]
fn oversized_packet_reported() {
    let input = packets(&[(b'B', vec![b'x'; 100])]);
    let (output, recorder, _) = run(input, Recording::default(), |builder| {
        builder.max_packet_size(64);
    });
    assert!(output.is_empty());
    assert_eq!(recorder.events, vec!["read_failed", "closed"]);
    assert!(recorder.errors[0].contains("exceeds maximum"));
}

#[test]
fn end_of_body_modifications() {
    let milter = Recording {
        tag_body: true,
        ..Default::default()
    };
    let input = packets(&[
        (b'B', b"Hello\r\n".to_vec()),
        (b'E', vec![]),
        (b'B', b"Again\r\n".to_vec()),
        (b'E', vec![]),
    ]);
    let (output, _, milter) = run(input, milter, |_| ());
    assert_eq!(
        milter.calls,
        vec!["body 7", "body 7"],
        "the second message starts with an empty body"
    );
    assert_eq!(codes(&output), b"chccha");
    assert_eq!(output[1].payload, cstrings(&["X-Length", "7"]));
}

#[test]
fn write_failure_reported() {
    let input = packets(&[(b'H', cstrings(&["a"])), (b'H', cstrings(&["b"]))]);
    let mut stream = Unwritable {
        input: Cursor::new(input),
    };
    let mut milter = Recording::default();
    let mut recorder = Recorder::default();
    SessionBuilder::new(Actions::empty(), Protocol::empty())
        .build_with_observer(&mut stream, &mut milter, &mut recorder)
        .run();
    assert_eq!(milter.calls, vec!["helo a"]);
    assert_eq!(recorder.events, vec!["write_failed", "closed"]);
    assert!(recorder.errors[0].contains("broken pipe"));
}

//------ Test support ----------------------------------------------------------

#[derive(Default)]
struct Recording {
    reject_mail: bool,
    reply_rcpt: bool,
    fail_helo: bool,
    tag_body: bool,
    calls: Vec<String>,
    end_of_headers: Vec<(String, String)>,
}

impl Milter for &mut Recording {
    fn connect(
        &mut self,
        hostname: &str,
        family: Family,
        address: &str,
        _m: &mut Modifier,
    ) -> Result<Response> {
        self.calls
            .push(format!("connect {} {} {}", hostname, family, address));
        Ok(CONTINUE)
    }

    fn helo(&mut self, name: &str, _m: &mut Modifier) -> Result<Response> {
        if self.fail_helo {
            return Err(Error::filter("helo refused"));
        }
        self.calls.push(format!("helo {}", name));
        Ok(CONTINUE)
    }

    fn mail_from(&mut self, from: &str, _m: &mut Modifier) -> Result<Response> {
        self.calls.push(format!("mail {}", from));
        if self.reject_mail {
            Ok(REJECT)
        } else {
            Ok(CONTINUE)
        }
    }

    fn rcpt_to(&mut self, rcpt: &str, _m: &mut Modifier) -> Result<Response> {
        self.calls.push(format!("rcpt {}", rcpt));
        if self.reply_rcpt {
            Ok(Response::reply_code(550, "5.1.1 No such user"))
        } else {
            Ok(CONTINUE)
        }
    }

    fn headers(&mut self, headers: &Headers, _m: &mut Modifier) -> Result<Response> {
        self.end_of_headers = headers
            .iter()
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
            .collect();
        Ok(CONTINUE)
    }

    fn body(&mut self, body: &[u8], m: &mut Modifier) -> Result<Response> {
        self.calls.push(format!("body {}", body.len()));
        if self.tag_body {
            m.add_header("X-Length", &body.len().to_string())?;
        }
        if self.calls.len() > 1 {
            Ok(ACCEPT)
        } else {
            Ok(CONTINUE)
        }
    }
}

struct Quiet;

impl Milter for Quiet {}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    errors: Vec<String>,
}

impl Observer for Recorder {
    fn read_failed(&mut self, err: &Error) {
        self.events.push("read_failed".to_owned());
        self.errors.push(err.to_string());
    }

    fn process_failed(&mut self, err: &Error) {
        self.events.push("process_failed".to_owned());
        self.errors.push(err.to_string());
    }

    fn write_failed(&mut self, err: &Error) {
        self.events.push("write_failed".to_owned());
        self.errors.push(err.to_string());
    }

    fn unknown_command(&mut self, code: u8) {
        self.events.push(format!("unknown {}", char::from(code)));
    }

    fn closed(&mut self) {
        self.events.push("closed".to_owned());
    }
}

// An in memory MTA connection
struct Duplex {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl Duplex {
    fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// An MTA connection that has stopped reading
struct Unwritable {
    input: Cursor<Vec<u8>>,
}

impl Read for Unwritable {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Unwritable {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Run a session over the input, returning the packets written back
fn run<F>(input: Vec<u8>, mut milter: Recording, configure: F) -> (Vec<Packet>, Recorder, Recording)
where
    F: FnOnce(&mut SessionBuilder),
{
    let mut stream = Duplex::new(input);
    let mut recorder = Recorder::default();
    let mut builder = SessionBuilder::new(Actions::ADD_HEADER | Actions::ADD_RCPT, Protocol::NO_HELO);
    configure(&mut builder);
    builder
        .build_with_observer(&mut stream, &mut milter, &mut recorder)
        .run();
    let mut output = Cursor::new(stream.output);
    let mut written = Vec::new();
    while let Some(packet) = Packet::read_from(&mut output, DEFAULT_MAX_PACKET_SIZE).unwrap() {
        written.push(packet);
    }
    (written, recorder, milter)
}

fn packets(list: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (code, payload) in list {
        Packet::new(*code, payload.clone()).write_to(&mut buf).unwrap();
    }
    buf
}

fn cstrings(parts: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    for part in parts {
        buf.extend_from_slice(part.as_bytes());
        buf.push(0);
    }
    buf
}

fn codes(packets: &[Packet]) -> Vec<u8> {
    packets.iter().map(|p| p.code).collect()
}
