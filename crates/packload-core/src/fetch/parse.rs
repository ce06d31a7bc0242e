//! Response header lines → [`ResponseHead`].

use super::ResponseHead;

/// Folds one raw header line into `head`. A status line starts a new
/// response (redirect hops each send one), discarding earlier headers.
pub(crate) fn apply_header_line(head: &mut ResponseHead, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if line.starts_with("HTTP/") {
        *head = ResponseHead {
            status: line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0),
            ..ResponseHead::default()
        };
        return;
    }
    if let Some((name, value)) = line.split_once(':') {
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-encoding") {
            head.content_encoding = Some(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(lines: &[&str]) -> ResponseHead {
        let mut head = ResponseHead::default();
        for l in lines {
            apply_header_line(&mut head, l);
        }
        head
    }

    #[test]
    fn status_length_and_encoding() {
        let h = head_of(&[
            "HTTP/1.1 200 OK\r\n",
            "Content-Length: 12345\r\n",
            "Content-Encoding: pack200-gzip\r\n",
            "\r\n",
        ]);
        assert_eq!(h.status, 200);
        assert_eq!(h.content_length, Some(12345));
        assert_eq!(h.content_encoding.as_deref(), Some("pack200-gzip"));
    }

    #[test]
    fn redirect_resets_headers() {
        let h = head_of(&[
            "HTTP/1.1 302 Found",
            "Content-Length: 0",
            "Location: /elsewhere",
            "",
            "HTTP/1.1 200 OK",
            "Content-Type: application/java-archive",
        ]);
        assert_eq!(h.status, 200);
        assert_eq!(h.content_length, None);
        assert_eq!(h.content_encoding, None);
    }

    #[test]
    fn bad_length_is_ignored() {
        let h = head_of(&["HTTP/2 200", "content-length: lots"]);
        assert_eq!(h.status, 200);
        assert_eq!(h.content_length, None);
    }
}
