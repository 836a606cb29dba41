use super::*;

fn toggle_binder() -> Result<Binder<Dom>> {
    let mut binder = Binder::new();
    binder.register("[data-toggle]", |element: &mut ElementHandle<'_, Dom>| {
        let target = element
            .data("toggle")
            .ok_or("data-toggle without a target")?;
        element.on("click", move |dom: &mut Dom, _event: &Event<NodeId>| {
            let Some(panel) = dom.query_selector(&target)? else {
                return Err(Error::SelectorNotFound(target.clone()));
            };
            dom.class_toggle(panel, "open")?;
            Ok(())
        })?;
        element.set_data("bound", "1")?;
        Ok(())
    })?;
    Ok(binder)
}

#[test]
fn ready_binds_behaviors_and_clicks_reach_them() -> Result<()> {
    let html = r#"
        <button id='btn' data-toggle='#panel'>menu</button>
        <nav id='panel'></nav>
        "#;

    let mut page = Page::from_html(html, toggle_binder()?)?;
    page.assert_attr("#btn", "data-bound", None)?;
    page.click("#btn")?;
    page.assert_count("#panel.open", 0)?;

    page.ready()?;
    page.assert_attr("#btn", "data-bound", Some("1"))?;
    page.click("#btn")?;
    page.assert_exists("#panel.open")?;
    page.click("#btn")?;
    page.assert_count("#panel.open", 0)?;

    page.ready()?;
    page.click("#btn")?;
    page.assert_exists("#panel.open")?;
    Ok(())
}

#[test]
fn insert_html_scans_only_new_content() -> Result<()> {
    let html = "<ul id='list'><li class='row'>a</li></ul>";
    let calls = Calls::default();
    let mut binder = Binder::new();
    binder.register(".row", marking(&calls))?;
    let mut page = Page::from_html(html, binder)?;

    // The existing row was never scanned, and insert_html leaves it alone.
    let report = page.insert_html("#list", "<li class='row'>b</li><li class='row'>c</li>")?;
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 0);
    page.assert_count(".row[data-init]", 2)?;
    page.assert_attr("li:first-child", "data-init", None)?;

    page.ready()?;
    page.assert_count(".row[data-init]", 3)?;
    assert_eq!(calls.borrow().len(), 3);
    Ok(())
}

#[test]
fn nested_matches_inside_inserted_content_are_bound() -> Result<()> {
    let calls = Calls::default();
    let mut binder = Binder::new();
    binder.register(".card, .card .action", marking(&calls))?;
    let mut page = Page::from_html("<section id='feed'></section>", binder)?;
    page.ready()?;

    page.insert_html(
        "#feed",
        "<article class='card'><button class='action'>x</button></article>",
    )?;
    page.assert_attr(".card", "data-init", Some("1"))?;
    page.assert_attr(".card .action", "data-init", Some("1"))?;
    Ok(())
}

#[test]
fn replace_html_prunes_old_records_and_binds_new_content() -> Result<()> {
    let calls = Calls::default();
    let mut binder = Binder::new();
    binder.register(".w", marking(&calls))?;
    let mut page = Page::from_html(
        "<div id='mount'><p class='w' id='first'></p></div>",
        binder,
    )?;
    page.ready()?;
    assert_eq!(page.binder().bound_node_count(), 1);

    page.replace_html("#mount", "<p class='w' id='second'></p>")?;
    page.assert_attr("#second", "data-init", Some("1"))?;
    assert_eq!(page.binder().bound_node_count(), 1);
    assert_eq!(calls.borrow().len(), 2);

    page.remove("#second")?;
    assert_eq!(page.binder().bound_node_count(), 0);
    Ok(())
}

#[test]
fn failures_accumulate_across_lifecycle_scans() -> Result<()> {
    let mut binder = Binder::new();
    binder.register(".fragile", |_: &mut ElementHandle<'_, Dom>| -> InitResult {
        Err("fragile widget".into())
    })?;
    binder.register(".fragile", |element: &mut ElementHandle<'_, Dom>| {
        element.set_data("after", "1")?;
        Ok(())
    })?;
    let mut page = Page::from_html("<main><i class='fragile'></i></main>", binder)?;

    let report = page.ready()?;
    assert_eq!(report.failures.len(), 1);
    page.insert_html("main", "<i class='fragile' id='late'></i>")?;
    page.assert_attr("#late", "data-after", Some("1"))?;

    assert_eq!(page.failures().len(), 2);
    let failures = page.take_failures();
    assert!(failures.iter().all(|failure| failure.message == "fragile widget"));
    assert!(page.failures().is_empty());
    Ok(())
}

#[test]
fn listeners_bubble_to_bound_ancestors() -> Result<()> {
    let mut binder = Binder::new();
    binder.register("[data-count-clicks]", |element: &mut ElementHandle<'_, Dom>| {
        element.on("click", |dom: &mut Dom, event: &Event<NodeId>| {
            let node = event.current_target();
            let count = dom
                .data(node, "clicks")
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(0);
            dom.set_data(node, "clicks", &(count + 1).to_string())
        })?;
        Ok(())
    })?;
    let html = "<div id='outer' data-count-clicks><span id='inner'><b id='leaf'>x</b></span></div>";
    let mut page = Page::from_html(html, binder)?;
    page.ready()?;

    page.click("#leaf")?;
    page.click("#inner")?;
    page.dispatch("#outer", "focus")?;
    page.assert_attr("#outer", "data-clicks", Some("2"))?;
    Ok(())
}

#[test]
fn assertion_failures_carry_context() -> Result<()> {
    let page = Page::from_html("<p id='msg'>hello</p>", Binder::new())?;
    page.assert_text("#msg", "hello")?;

    match page.assert_text("#msg", "bye") {
        Err(Error::AssertionFailed {
            selector,
            expected,
            actual,
            dom_snippet,
        }) => {
            assert_eq!(selector, "#msg");
            assert_eq!(expected, "bye");
            assert_eq!(actual, "hello");
            assert_eq!(dom_snippet, r#"<p id="msg">hello</p>"#);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match page.assert_count("p", 2) {
        Err(Error::AssertionFailed { actual, .. }) => assert_eq!(actual, "1"),
        other => panic!("unexpected result: {other:?}"),
    }
    match page.assert_exists("#missing") {
        Err(Error::SelectorNotFound(selector)) => assert_eq!(selector, "#missing"),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn page_trace_logs_come_from_the_binder() -> Result<()> {
    let mut binder = Binder::<Dom>::new();
    binder.enable_trace(true);
    binder.set_trace_stderr(false);
    binder.register("p", |_: &mut ElementHandle<'_, Dom>| Ok(()))?;
    let mut page = Page::from_html("<p></p>", binder)?;
    page.take_trace_logs();

    page.ready()?;
    let logs = page.take_trace_logs();
    assert!(logs.iter().any(|line| line.starts_with("[bind] apply selector=p node=")));
    assert!(
        logs.iter()
            .any(|line| line == "[bind] scan root=NodeId(0) applied=1 skipped=0 failed=0")
    );
    Ok(())
}

#[test]
fn assertion_snippets_are_truncated() -> Result<()> {
    let text = "x".repeat(500);
    let page = Page::from_html(&format!("<p id='long'>{text}</p>"), Binder::new())?;
    match page.assert_text("#long", "short") {
        Err(Error::AssertionFailed { dom_snippet, .. }) => {
            assert!(dom_snippet.ends_with("..."));
            assert_eq!(dom_snippet.chars().count(), 203);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}
