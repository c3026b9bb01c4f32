//! Corrective percent-encoding for request targets the transport rejected.

/// Percent-encode the path, query and fragment of `url`, leaving the scheme,
/// authority and structural delimiters (`/`, `?`, `&`, `=`, `+`, `#`) intact.
///
/// Existing escapes are decoded first so already-valid sequences are not
/// encoded twice.
pub fn encode_url_components(url: &str) -> String {
    let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    let rest_start = url[authority_start..]
        .find(['/', '?', '#'])
        .map(|i| authority_start + i)
        .unwrap_or(url.len());

    let (origin, rest) = url.split_at(rest_start);
    let (rest, fragment) = match rest.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (rest, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut out = String::with_capacity(url.len() + 16);
    out.push_str(origin);
    out.push_str(
        &path
            .split('/')
            .map(encode_component)
            .collect::<Vec<_>>()
            .join("/"),
    );

    if let Some(query) = query {
        out.push('?');
        out.push_str(&encode_query(query));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(&encode_component(fragment));
    }
    out
}

fn encode_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => format!("{}={}", encode_plus_separated(key), encode_plus_separated(value)),
            None => encode_plus_separated(pair),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_plus_separated(s: &str) -> String {
    s.split('+').map(encode_component).collect::<Vec<_>>().join("+")
}

fn encode_component(s: &str) -> String {
    let decoded = urlencoding::decode(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    urlencoding::encode(&decoded).into_owned()
}
