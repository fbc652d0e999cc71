use anyhow::{bail, Error};
use log::info;
use milter::{Family, Headers, Milter, Modifier, Response, Result, CONTINUE};
use std::sync::Arc;

/// A header added to every message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtraHeader {
    pub name: String,
    pub value: String,
}

impl std::str::FromStr for ExtraHeader {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, value) = match s.split_once(':') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => bail!("Header '{}' is not NAME:VALUE", s),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            bail!("Invalid header name in '{}'", s);
        }
        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Logs each stage, refuses some recipients and tags messages
#[derive(Clone)]
pub struct ExampleFilter {
    // Shared by the clones made for each connection
    reject_rcpt: Arc<Vec<String>>,
    header: Option<Arc<ExtraHeader>>,
}

impl ExampleFilter {
    pub fn new(reject_rcpt: Vec<String>, header: Option<ExtraHeader>) -> Self {
        Self {
            reject_rcpt: Arc::new(reject_rcpt),
            header: header.map(Arc::new),
        }
    }

    fn rejected(&self, rcpt: &str) -> bool {
        self.reject_rcpt.iter().any(|r| r.eq_ignore_ascii_case(rcpt))
    }
}

impl Milter for ExampleFilter {
    fn connect(
        &mut self,
        hostname: &str,
        family: Family,
        address: &str,
        _m: &mut Modifier,
    ) -> Result<Response> {
        info!("Connect from {} ({} {})", hostname, family, address);
        Ok(CONTINUE)
    }

    fn helo(&mut self, name: &str, m: &mut Modifier) -> Result<Response> {
        info!("HELO {} (queue id {:?})", name, m.macro_value("i"));
        Ok(CONTINUE)
    }

    fn mail_from(&mut self, from: &str, _m: &mut Modifier) -> Result<Response> {
        info!("MAIL FROM {}", from);
        Ok(CONTINUE)
    }

    fn rcpt_to(&mut self, rcpt: &str, _m: &mut Modifier) -> Result<Response> {
        if self.rejected(rcpt) {
            info!("Rejecting RCPT TO {}", rcpt);
            return Ok(Response::reply_code(550, "5.7.1 Recipient rejected"));
        }
        info!("RCPT TO {}", rcpt);
        Ok(CONTINUE)
    }

    fn headers(&mut self, headers: &Headers, _m: &mut Modifier) -> Result<Response> {
        info!(
            "{} headers, subject {:?}",
            headers.len(),
            headers.get("subject").unwrap_or("")
        );
        Ok(CONTINUE)
    }

    fn body(&mut self, body: &[u8], m: &mut Modifier) -> Result<Response> {
        info!("Body of {} bytes", body.len());
        if let Some(header) = &self.header {
            m.add_header(&header.name, &header.value)?;
        }
        Ok(CONTINUE)
    }
}
