//! TwiML documents returned from the call-control webhook

/// Escape text for an XML attribute or text node
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Connect the answered call to the realtime media bridge
pub fn connect_stream(stream_url: &str, call_request_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{url}">
      <Parameter name="callRequestId" value="{id}"/>
    </Stream>
  </Connect>
</Response>"#,
        url = escape(stream_url),
        id = escape(call_request_id),
    )
}

/// Speak a fixed message and hang up
pub fn say_and_hangup(message: &str, language: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say language="{lang}">{msg}</Say>
  <Hangup/>
</Response>"#,
        lang = escape(language),
        msg = escape(message),
    )
}

/// Hang up immediately
pub fn hangup() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Hangup/>
</Response>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stream_carries_call_request_id() {
        let xml = connect_stream("wss://bridge.example.com/media", "abc-123");
        assert!(xml.contains(r#"<Stream url="wss://bridge.example.com/media">"#));
        assert!(xml.contains(r#"value="abc-123""#));
    }

    #[test]
    fn test_say_escapes_text() {
        let xml = say_and_hangup("Ciao <Marco> & co", "it-IT");
        assert!(xml.contains("Ciao &lt;Marco&gt; &amp; co"));
        assert!(xml.contains("<Hangup/>"));
    }
}
