//! Fetched message headers.

use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeader, MailHeaderMap, addrparse_header, dateparse};

use super::error::PartialFetchError;

/// Header data of one fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Folder the message was fetched from.
    pub folder: String,
    /// Server UID.
    pub uid: u32,
    /// `Message-ID`, or a synthetic identifier when absent.
    pub message_id: String,
    /// Sender address, lowercase.
    pub from: Option<String>,
    /// `To` and `Cc` addresses, lowercase.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// `Date` header, falling back to the server's internal date.
    pub timestamp: DateTime<Utc>,
}

/// Build a [`FetchedMessage`] from raw header bytes.
///
/// # Errors
///
/// Returns a [`PartialFetchError`] if the headers cannot be parsed or the
/// message carries no usable date.
pub fn parse_fetched(
    folder: &str,
    uid_validity: u32,
    uid: u32,
    header: &[u8],
    internal_date: Option<DateTime<Utc>>,
) -> Result<FetchedMessage, PartialFetchError> {
    let (headers, _) = mailparse::parse_headers(header)
        .map_err(|e| PartialFetchError::new(folder, uid, format!("unparsable headers: {e}")))?;

    let timestamp = headers
        .get_first_value("Date")
        .and_then(|value| dateparse(&value).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .or(internal_date)
        .ok_or_else(|| PartialFetchError::new(folder, uid, "no usable Date or INTERNALDATE"))?;

    let message_id = headers
        .get_first_value("Message-ID")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| synthetic_id(folder, uid_validity, uid));

    let from = headers
        .get_first_header("From")
        .map(addresses)
        .and_then(|list| list.into_iter().next());

    let recipients = ["To", "Cc"]
        .iter()
        .flat_map(|name| headers.get_all_headers(name))
        .flat_map(addresses)
        .collect();

    Ok(FetchedMessage {
        folder: folder.to_string(),
        uid,
        message_id,
        from,
        recipients,
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        timestamp,
    })
}

/// Stable identifier for messages without a `Message-ID`.
fn synthetic_id(folder: &str, uid_validity: u32, uid: u32) -> String {
    format!("<{uid_validity}.{uid}@{folder}.replyledger.invalid>")
}

/// Addresses in one header, lowercase. Unparsable headers yield nothing.
fn addresses(header: &MailHeader<'_>) -> Vec<String> {
    let Ok(list) = addrparse_header(header) else {
        return Vec::new();
    };
    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => vec![single.addr.to_lowercase()],
            MailAddr::Group(group) => group
                .addrs
                .iter()
                .map(|single| single.addr.to_lowercase())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEADERS: &[u8] = b"Message-ID: <abc@acme.com>\r\n\
From: \"Acme Accounts\" <Accounts@Acme.com>\r\n\
To: auditor@firm.co.za, Other <other@firm.co.za>\r\n\
Cc: Team: a@acme.com, b@acme.com;\r\n\
Subject: Re: outstanding documents\r\n\
Date: Tue, 3 Jun 2025 10:15:00 +0200\r\n\r\n";

    #[test]
    fn test_parse_full_headers() {
        let msg = parse_fetched("INBOX", 1, 10, HEADERS, None).unwrap();
        assert_eq!(msg.message_id, "<abc@acme.com>");
        assert_eq!(msg.from.as_deref(), Some("accounts@acme.com"));
        assert_eq!(
            msg.recipients,
            vec!["auditor@firm.co.za", "other@firm.co.za", "a@acme.com", "b@acme.com"]
        );
        assert_eq!(msg.subject, "Re: outstanding documents");
        assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2025, 6, 3, 8, 15, 0).unwrap());
    }

    #[test]
    fn test_missing_message_id_is_synthetic_and_stable() {
        let raw = b"From: a@acme.com\r\nDate: Tue, 3 Jun 2025 10:15:00 +0000\r\n\r\n";
        let first = parse_fetched("Sent", 7, 99, raw, None).unwrap();
        let second = parse_fetched("Sent", 7, 99, raw, None).unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert_ne!(
            first.message_id,
            parse_fetched("Sent", 8, 99, raw, None).unwrap().message_id
        );
    }

    #[test]
    fn test_bad_date_falls_back_to_internal_date() {
        let raw = b"From: a@acme.com\r\nDate: sometime soon\r\n\r\n";
        let internal = Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap();
        let msg = parse_fetched("INBOX", 1, 1, raw, Some(internal)).unwrap();
        assert_eq!(msg.timestamp, internal);
    }

    #[test]
    fn test_no_date_at_all_is_partial_failure() {
        let raw = b"From: a@acme.com\r\n\r\n";
        let err = parse_fetched("INBOX", 1, 5, raw, None).unwrap_err();
        assert_eq!(err.uid, 5);
        assert_eq!(err.folder, "INBOX");
    }
}
