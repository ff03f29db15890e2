use form_spec::{
    FormSession, SchemaIndex,
    render::{RenderStatus, build_render_payload, render_json_ui, render_text},
};

fn fixture(name: &str) -> &'static str {
    match name {
        "household" => include_str!("../tests/fixtures/household.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

#[test]
fn render_text_lists_visible_questions_of_current_section() {
    let index = SchemaIndex::from_json(fixture("household")).expect("deserialize");
    let mut session = FormSession::start(&index);
    session.set_value("favorite_color", "Blue").expect("color");

    let payload = build_render_payload(&session);
    assert_eq!(payload.status, RenderStatus::InProgress);
    assert_eq!(payload.section_title.as_deref(), Some("About you"));

    let text = render_text(&payload);
    assert!(text.contains("Section: About you"));
    assert!(text.contains("favorite_color = Blue"));
    assert!(!text.contains("Shade of red"));
    assert!(!text.contains("favorite_color_selected"));
}

#[test]
fn render_json_ui_substitutes_expressions() {
    let index = SchemaIndex::from_json(fixture("household")).expect("deserialize");
    let mut session = FormSession::start(&index);
    session.set_value("income", "1200").expect("income");
    session.set_value("tax", "200").expect("tax");
    session.go_to(4);

    let ui = render_json_ui(&build_render_payload(&session));
    assert_eq!(ui["form_id"], "household");
    assert_eq!(ui["section_title"], "Review: net 1000");
    assert_eq!(ui["progress"]["section"], 4);
    assert_eq!(ui["progress"]["total"], 4);

    let questions = ui["questions"].as_array().expect("questions array");
    assert_eq!(questions[0]["id"], "ready");
    assert_eq!(questions[0]["description"], "Monthly income on file: 1200");
    let controls = questions[0]["controls"].as_array().expect("controls");
    assert_eq!(controls[0]["name"], "ready_to_submit");
    assert_eq!(controls[0]["options"][1], "No");
}

#[test]
fn completed_form_renders_without_section() {
    let index = SchemaIndex::from_json(fixture("household")).expect("deserialize");
    let mut session = FormSession::start(&index);
    session.go_to(4);
    session.set_value("ready_to_submit", "Yes").expect("ready");
    session.advance();

    let payload = build_render_payload(&session);
    assert_eq!(payload.status, RenderStatus::Complete);
    assert!(payload.questions.is_empty());
    assert!(render_text(&payload).contains("The form is complete."));
    assert_eq!(render_json_ui(&payload)["status"], "complete");
}
