//! Hand-built `multipart/form-data` payloads.
//!
//! The encoder is a pure function over the form values: no I/O, no clock.
//! The boundary is not checked against the payload contents.

use uuid::Uuid;

const BOUNDARY_PREFIX: &str = "mailform-";

/// Field names in the order they are written on the wire.
pub const RECIPIENT_FIELD: &str = "to";
pub const SUBJECT_FIELD: &str = "subject";
pub const BODY_FIELD: &str = "message";
pub const FILE_FIELD: &str = "file";

/// The three text values of the form, borrowed for encoding.
#[derive(Debug, Clone, Copy)]
pub struct TextFields<'a> {
    pub recipient: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

impl<'a> TextFields<'a> {
    fn ordered(&self) -> [(&'static str, &'a str); 3] {
        [
            (RECIPIENT_FIELD, self.recipient),
            (SUBJECT_FIELD, self.subject),
            (BODY_FIELD, self.body),
        ]
    }
}

/// A file attachment with its contents already read.
#[derive(Debug, Clone, Copy)]
pub struct FilePart<'a> {
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// Serialized request body plus the matching `Content-Type` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Returns a fresh boundary token backed by a random 128-bit UUID.
pub fn generate_boundary() -> String {
    format!("{}{}", BOUNDARY_PREFIX, Uuid::new_v4().simple())
}

/// Encode the form with a newly generated boundary.
pub fn build_multipart(fields: TextFields<'_>, file: Option<FilePart<'_>>) -> MultipartBody {
    build_multipart_with_boundary(fields, file, &generate_boundary())
}

/// Encode the form with a caller-supplied boundary.
///
/// Output is a function of the inputs only, so identical inputs and the same
/// boundary always give identical bytes.
pub fn build_multipart_with_boundary(
    fields: TextFields<'_>,
    file: Option<FilePart<'_>>,
    boundary: &str,
) -> MultipartBody {
    let file_len = file.map_or(0, |f| f.data.len() + f.filename.len() + 128);
    let text_len: usize = fields.ordered().iter().map(|(_, v)| v.len() + 64).sum();
    let mut bytes = Vec::with_capacity(text_len + file_len + boundary.len() * 5);

    for (name, value) in fields.ordered() {
        open_part(&mut bytes, boundary);
        bytes.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        bytes.extend_from_slice(value.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }

    if let Some(file) = file {
        open_part(&mut bytes, boundary);
        bytes.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                FILE_FIELD,
                escape_filename(file.filename)
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        bytes.extend_from_slice(file.data);
        bytes.extend_from_slice(b"\r\n");
    }

    bytes.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    MultipartBody {
        boundary: boundary.to_string(),
        content_type: format!("multipart/form-data; boundary={}", boundary),
        bytes,
    }
}

fn open_part(bytes: &mut Vec<u8>, boundary: &str) {
    bytes.extend_from_slice(b"--");
    bytes.extend_from_slice(boundary.as_bytes());
    bytes.extend_from_slice(b"\r\n");
}

/// Percent-encode the characters that would end the quoted filename or the
/// header line, matching what browsers send.
fn escape_filename(filename: &str) -> String {
    let mut escaped = String::with_capacity(filename.len());
    for c in filename.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::{MessageParser, MimeHeaders};

    fn fields<'a>(recipient: &'a str, subject: &'a str, body: &'a str) -> TextFields<'a> {
        TextFields {
            recipient,
            subject,
            body,
        }
    }

    /// Parse a payload the way a receiving server would and return
    /// `(name, filename, contents)` for every form-data part.
    fn parse_parts(body: &MultipartBody) -> Vec<(String, Option<String>, Vec<u8>)> {
        let mut raw = format!("Content-Type: {}\r\n\r\n", body.content_type).into_bytes();
        raw.extend_from_slice(&body.bytes);

        let message = MessageParser::default()
            .parse(&raw[..])
            .expect("payload should parse as MIME");

        message
            .parts
            .iter()
            .filter_map(|part| {
                let disposition = part.content_disposition()?;
                if disposition.ctype() != "form-data" {
                    return None;
                }
                Some((
                    disposition.attribute("name")?.to_string(),
                    disposition.attribute("filename").map(str::to_string),
                    part.contents().to_vec(),
                ))
            })
            .collect()
    }

    #[test]
    fn test_exact_wire_format() {
        let body = build_multipart_with_boundary(
            fields("ali@example.com", "Hello", "Line one"),
            Some(FilePart {
                filename: "notes.txt",
                data: b"abc",
            }),
            "XYZ",
        );

        let expected = "--XYZ\r\n\
Content-Disposition: form-data; name=\"to\"\r\n\r\n\
ali@example.com\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"subject\"\r\n\r\n\
Hello\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"message\"\r\n\r\n\
Line one\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
Content-Type: application/octet-stream\r\n\r\n\
abc\r\n\
--XYZ--\r\n";

        assert_eq!(String::from_utf8(body.bytes).unwrap(), expected);
        assert_eq!(body.content_type, "multipart/form-data; boundary=XYZ");
        assert_eq!(body.boundary, "XYZ");
    }

    #[test]
    fn test_same_boundary_gives_identical_bytes() {
        let data = vec![0u8, 159, 146, 150, 13, 10, 45, 45];
        let build = || {
            build_multipart_with_boundary(
                fields("a@b.c", "subj", "body"),
                Some(FilePart {
                    filename: "blob.bin",
                    data: &data,
                }),
                "fixed-boundary",
            )
        };

        assert_eq!(build(), build());
    }

    #[test]
    fn test_boundaries_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let body = build_multipart(fields("", "", ""), None);
            assert!(body.boundary.starts_with(BOUNDARY_PREFIX));
            assert!(seen.insert(body.boundary));
        }
    }

    #[test]
    fn test_no_attachment_has_three_parts() {
        let body = build_multipart(fields("x@y.z", "s", "b"), None);
        let text = String::from_utf8(body.bytes.clone()).unwrap();

        assert_eq!(text.matches(&format!("--{}\r\n", body.boundary)).count(), 3);
        assert!(!text.contains("name=\"file\""));
        assert!(text.ends_with(&format!("--{}--\r\n", body.boundary)));

        let parts = parse_parts(&body);
        let names: Vec<&str> = parts.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["to", "subject", "message"]);
    }

    #[test]
    fn test_round_trip_through_mime_parser() {
        let cases = [
            ("", "", ""),
            ("someone@example.com", "a -- b", "--not a boundary--"),
            ("x@y.z", "Re: line\r\nbreak", "first\r\nsecond\r\n\r\nfourth"),
            ("ünïcödé@example.com", "Merhaba dünya", "Gönderildi ✅"),
        ];
        let attachment: Vec<u8> = (0..=255u8).chain(b"\r\n--\r\n".iter().copied()).collect();

        for (recipient, subject, message) in cases {
            let body = build_multipart(
                fields(recipient, subject, message),
                Some(FilePart {
                    filename: "report final.pdf",
                    data: &attachment,
                }),
            );
            let parts = parse_parts(&body);

            assert_eq!(parts.len(), 4, "case {:?}", (recipient, subject, message));
            assert_eq!(parts[0], ("to".to_string(), None, recipient.as_bytes().to_vec()));
            assert_eq!(parts[1], ("subject".to_string(), None, subject.as_bytes().to_vec()));
            assert_eq!(parts[2], ("message".to_string(), None, message.as_bytes().to_vec()));
            assert_eq!(parts[3].0, "file");
            assert_eq!(parts[3].1.as_deref(), Some("report final.pdf"));
            assert_eq!(parts[3].2, attachment);
        }
    }

    #[test]
    fn test_empty_attachment_still_emits_file_part() {
        let body = build_multipart_with_boundary(
            fields("a", "b", "c"),
            Some(FilePart {
                filename: "empty.txt",
                data: &[],
            }),
            "B",
        );
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains(
            "filename=\"empty.txt\"\r\nContent-Type: application/octet-stream\r\n\r\n\r\n--B--\r\n"
        ));
    }

    #[test]
    fn test_filename_quotes_and_newlines_are_escaped() {
        assert_eq!(escape_filename("plain.pdf"), "plain.pdf");
        assert_eq!(escape_filename("a\"b.txt"), "a%22b.txt");
        assert_eq!(escape_filename("x\r\ny"), "x%0D%0Ay");

        let body = build_multipart_with_boundary(
            fields("", "", ""),
            Some(FilePart {
                filename: "evil\"\r\nX-Injected: 1",
                data: b"!",
            }),
            "B",
        );
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(!text.contains("\r\nX-Injected"));
    }
}
