// States & Union Territories - the single allow-list for state lookups
// Add new regions here and nowhere else

/// Display names of every state/UT the warehouse carries data for
pub const STATES: [&str; 36] = [
    "Andaman and Nicobar Islands",
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Delhi",
    "Chandigarh",
    "Ladakh",
    "Lakshadweep",
    "Puducherry",
    "Jammu and Kashmir",
    "Dadra and Nagar Haveli and Daman and Diu",
];

/// Canonical key used to join financial and tourism rows
pub fn state_key(name: &str) -> String {
    name.to_lowercase()
}

pub fn is_valid_state(name: &str) -> bool {
    let key = state_key(name);
    STATES.iter().any(|s| state_key(s) == key)
}

/// Display name for a key, if the key is known
pub fn display_name(key: &str) -> Option<&'static str> {
    let key = state_key(key);
    STATES.iter().copied().find(|s| state_key(s) == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(is_valid_state("kerala"));
        assert!(is_valid_state("KERALA"));
        assert!(is_valid_state("Tamil Nadu"));
        assert!(is_valid_state("dadra and nagar haveli and daman and diu"));
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(!is_valid_state(""));
        assert!(!is_valid_state("atlantis"));
        assert!(!is_valid_state("tamil_nadu"));
    }

    #[test]
    fn test_display_name_roundtrip() {
        assert_eq!(display_name("jammu and kashmir"), Some("Jammu and Kashmir"));
        assert_eq!(display_name("narnia"), None);
        assert_eq!(state_key("West Bengal"), "west bengal");
    }

    #[test]
    fn test_no_duplicate_keys() {
        let mut keys: Vec<String> = STATES.iter().map(|s| state_key(s)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), STATES.len());
    }
}
