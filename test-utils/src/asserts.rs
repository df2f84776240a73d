pub fn assert_str_contains(s1: &str, to_contain: &str) {
    assert!(
        s1.contains(to_contain),
        "String does not contain expected value. \nString: `{s1}`\nDoes not contain: `{to_contain}`"
    );
}
