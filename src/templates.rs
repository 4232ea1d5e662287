use tera::Tera;

/// Builds the template set. The templates are compiled into the binary so the
/// server does not depend on its working directory.
pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        ("polls/index.html", include_str!("../templates/polls/index.html")),
        ("polls/detail.html", include_str!("../templates/polls/detail.html")),
        ("polls/results.html", include_str!("../templates/polls/results.html")),
        (
            "registration/login.html",
            include_str!("../templates/registration/login.html"),
        ),
        (
            "registration/signup.html",
            include_str!("../templates/registration/signup.html"),
        ),
    ])?;
    Ok(tera)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_compile() {
        let tera = load().unwrap();
        let names: Vec<&str> = tera.get_template_names().collect();
        assert!(names.contains(&"polls/detail.html"));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn question_text_is_escaped() {
        let tera = load().unwrap();
        let mut context = tera::Context::new();
        context.insert(
            "latest_question_list",
            &vec![serde_json::json!({"id": 1, "question_text": "<b>bold</b>"})],
        );
        let html = tera.render("polls/index.html", &context).unwrap();
        assert!(html.contains("&lt;b&gt;bold&lt;&#x2F;b&gt;"));
    }
}
