//! Assembles a project's web files into one self-contained document.

use crate::model::Project;

/// Build the HTML document a preview surface would render for this
/// project. Pure function of the project's files: the stylesheet is
/// inlined in the head, the markup becomes the body, and the script runs
/// at the end. Files are looked up by their canonical names; a missing
/// file contributes an empty section.
pub fn build_preview_doc(project: &Project) -> String {
    let html = section(project, "index.html");
    let css = section(project, "styles.css");
    let js = section(project, "main.js");

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<style>{css}</style>\n</head>\n<body>\n{html}\n<script>{js}</script>\n</body>\n</html>\n"
    )
}

fn section(project: &Project, name: &str) -> String {
    project
        .file_by_name(name)
        .map(|f| f.content.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileNode;

    #[test]
    fn test_sections_come_from_canonical_files() {
        let project = Project::handcrafted("Demo");
        let doc = build_preview_doc(&project);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<style>body { font-family: sans-serif;"));
        assert!(doc.contains("<div id=\"root\">Hello Astra!</div>"));
        assert!(doc.contains("<script>console.log(\"Astra Agent ready.\");</script>"));
    }

    #[test]
    fn test_missing_files_leave_sections_empty() {
        let mut project = Project::handcrafted("Demo");
        project.files = vec![FileNode::new("readme.md", "# hi", "markdown")];
        let doc = build_preview_doc(&project);
        assert!(doc.contains("<style></style>"));
        assert!(doc.contains("<script></script>"));
        assert!(!doc.contains("# hi"));
    }
}
