// Paging descriptor handling for list responses.
//
// FMC list responses look like `{ items: [...], paging: { next: [url] } }`.
// The client follows `next` links in a loop; these helpers do the JSON
// bookkeeping so the loop stays readable.

use serde_json::Value;
use url::Url;

use crate::error::Error;

/// The page's `paging.next[0]` link, resolved against the page's own URL.
pub(crate) fn next_link(page: &Value, current: &Url) -> Result<Option<Url>, Error> {
    page.get("paging")
        .and_then(|paging| paging.get("next"))
        .and_then(|next| next.get(0))
        .and_then(Value::as_str)
        .map(|link| current.join(link))
        .transpose()
        .map_err(Error::from)
}

/// Move `page.items` onto the end of `acc.items`.
pub(crate) fn append_items(acc: &mut Value, page: Value) {
    let Value::Object(mut page) = page else {
        return;
    };
    let Some(Value::Array(items)) = page.remove("items") else {
        return;
    };
    let Some(acc) = acc.as_object_mut() else {
        return;
    };
    match acc
        .entry("items")
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(existing) => existing.extend(items),
        other => *other = Value::Array(items),
    }
}

/// Drop the paging descriptor from a fully materialised result.
pub(crate) fn strip_paging(acc: &mut Value) {
    if let Some(map) = acc.as_object_mut() {
        map.remove("paging");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn page_url() -> Url {
        Url::parse("https://fmc.local:8443/api/fmc_config/v1/domain/u1/object/hosts?offset=0")
            .unwrap()
    }

    #[test]
    fn next_link_absent_without_paging() {
        let page = json!({ "items": [] });
        assert_eq!(next_link(&page, &page_url()).unwrap(), None);
    }

    #[test]
    fn next_link_absent_when_paging_has_no_next() {
        let page = json!({ "items": [], "paging": { "offset": 0, "pages": 1 } });
        assert_eq!(next_link(&page, &page_url()).unwrap(), None);
    }

    #[test]
    fn next_link_takes_first_entry() {
        let page = json!({
            "paging": { "next": [
                "https://fmc.local:8443/api/fmc_config/v1/domain/u1/object/hosts?offset=25",
                "https://fmc.local:8443/api/ignored"
            ] }
        });
        let link = next_link(&page, &page_url()).unwrap().unwrap();
        assert_eq!(link.query(), Some("offset=25"));
    }

    #[test]
    fn relative_next_link_resolves_against_page() {
        let page = json!({ "paging": { "next": ["hosts?offset=50"] } });
        let link = next_link(&page, &page_url()).unwrap().unwrap();
        assert_eq!(
            link.as_str(),
            "https://fmc.local:8443/api/fmc_config/v1/domain/u1/object/hosts?offset=50"
        );
    }

    #[test]
    fn append_extends_items_and_keeps_first_page_fields() {
        let mut acc = json!({ "links": { "self": "p1" }, "items": ["a", "b"] });
        append_items(&mut acc, json!({ "links": { "self": "p2" }, "items": ["c"] }));
        assert_eq!(acc, json!({ "links": { "self": "p1" }, "items": ["a", "b", "c"] }));
    }

    #[test]
    fn append_creates_items_when_first_page_had_none() {
        let mut acc = json!({ "paging": {} });
        append_items(&mut acc, json!({ "items": [1] }));
        assert_eq!(acc["items"], json!([1]));
    }

    #[test]
    fn append_ignores_page_without_items() {
        let mut acc = json!({ "items": ["a"] });
        append_items(&mut acc, json!({ "paging": {} }));
        assert_eq!(acc, json!({ "items": ["a"] }));
    }

    #[test]
    fn strip_removes_paging_only() {
        let mut acc = json!({ "items": [], "paging": { "count": 0 } });
        strip_paging(&mut acc);
        assert_eq!(acc, json!({ "items": [] }));
    }
}
