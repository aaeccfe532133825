use serde::Serialize;

use crate::error::CtGovError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, CtGovError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::to_pretty;
    use crate::entities::SearchPage;

    #[test]
    fn to_pretty_serializes_with_indentation() {
        let json = to_pretty(&serde_json::json!({"nctId": "NCT04267848"})).expect("json");
        assert!(json.contains('\n'));
        assert!(json.contains("\"nctId\": \"NCT04267848\""));
    }

    #[test]
    fn json_search_page_omits_absent_total_and_token() {
        let page: SearchPage<serde_json::Value> = SearchPage::cursor(Vec::new(), None, None);
        let json = to_pretty(&page).expect("page json");
        assert!(json.contains("\"results\": []"));
        assert!(!json.contains("total"));
        assert!(!json.contains("next_page_token"));
    }

    #[test]
    fn json_search_page_keeps_token_verbatim() {
        let page = SearchPage::cursor(
            vec![serde_json::json!({"hasResults": false})],
            Some(12),
            Some("abc/+==".to_string()),
        );
        let json = to_pretty(&page).expect("page json");
        assert!(json.contains("\"total\": 12"));
        assert!(json.contains("\"next_page_token\": \"abc/+==\""));
    }
}
