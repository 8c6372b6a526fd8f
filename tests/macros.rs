#[test]
fn generated_messages_and_handlers() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/generic_messages.rs");
}
