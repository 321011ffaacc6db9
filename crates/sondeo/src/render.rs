//! Tree Rendering
//!
//! Draws a captured subtree for debugging, one element per line.
//!
//! ## Example Output
//!
//! ```text
//! application (contador)
//! └── frame (Contador)
//!     ├── label (Has pulsado 0 veces)
//!     └── push button (Contar) [click]
//!
//! Total: 4 elements
//! ```

use crate::element::ElementHandle;

/// What [`render_tree`] shows for each element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Maximum depth below the root (None = unlimited)
    pub max_depth: Option<usize>,
    /// List the actions each element offers
    pub show_actions: bool,
    /// List the state flags of each element
    pub show_states: bool,
    /// Print the element count after the tree
    pub show_total: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            show_actions: true,
            show_states: false,
            show_total: true,
        }
    }
}

impl RenderOptions {
    /// Set maximum depth
    #[must_use]
    pub const fn with_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether to list actions
    #[must_use]
    pub const fn with_actions(mut self, show: bool) -> Self {
        self.show_actions = show;
        self
    }

    /// Set whether to list state flags
    #[must_use]
    pub const fn with_states(mut self, show: bool) -> Self {
        self.show_states = show;
        self
    }

    /// Set whether to print the total line
    #[must_use]
    pub const fn with_total(mut self, show: bool) -> Self {
        self.show_total = show;
        self
    }
}

/// Render `root` and its descendants as a string
#[must_use]
pub fn render_tree(root: &ElementHandle, options: &RenderOptions) -> String {
    let mut output = String::new();
    push_line(root, options, &mut output);

    let mut shown = 1;
    if options.max_depth != Some(0) {
        shown += render_node_children(root.children(), options, "", 1, &mut output);
    }

    if options.show_total {
        output.push('\n');
        output.push_str(&format!(
            "Total: {shown} element{}\n",
            if shown == 1 { "" } else { "s" }
        ));
    }
    output
}

fn render_node_children(
    children: &[ElementHandle],
    options: &RenderOptions,
    prefix: &str,
    depth: usize,
    output: &mut String,
) -> usize {
    let len = children.len();
    let mut shown = 0;

    for (i, child) in children.iter().enumerate() {
        let is_last = i == len - 1;
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = if is_last { "    " } else { "│   " };

        output.push_str(prefix);
        output.push_str(connector);
        push_line(child, options, output);
        shown += 1;

        let deeper = options.max_depth.map_or(true, |max| depth < max);
        if deeper && !child.children().is_empty() {
            let new_prefix = format!("{prefix}{child_prefix}");
            shown +=
                render_node_children(child.children(), options, &new_prefix, depth + 1, output);
        }
    }
    shown
}

fn push_line(element: &ElementHandle, options: &RenderOptions, output: &mut String) {
    output.push_str(&element.to_string());
    if !element.text().is_empty() && element.text() != element.name() {
        output.push_str(&format!(" {:?}", element.text()));
    }
    if options.show_actions && !element.actions().is_empty() {
        output.push_str(&format!(" [{}]", element.actions().join(",")));
    }
    if options.show_states && !element.states().is_empty() {
        let states: Vec<&str> = element.states().iter().map(|s| s.as_str()).collect();
        output.push_str(&format!(" {{{}}}", states.join(", ")));
    }
    output.push('\n');
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::desktop::{InMemoryDesktop, NodeSpec};
    use crate::element::{NodeId, Role, State};

    fn counter() -> (InMemoryDesktop, NodeId) {
        let d = InMemoryDesktop::new();
        let app = d.add_application("contador");
        let frame = d
            .add_node(&app, NodeSpec::new(Role::Frame).name("Contador"))
            .unwrap();
        d.add_node(&frame, NodeSpec::new(Role::Label).name("Has pulsado 0 veces"))
            .unwrap();
        d.add_node(
            &frame,
            NodeSpec::new(Role::PushButton).name("Contar").action("click"),
        )
        .unwrap();
        (d, app)
    }

    #[test]
    fn test_render_full_tree() {
        let (d, app) = counter();
        let root = ElementHandle::capture(&d, &app).unwrap();
        let text = render_tree(&root, &RenderOptions::default());
        let expected = "application (contador)\n\
                        └── frame (Contador)\n    \
                        ├── label (Has pulsado 0 veces)\n    \
                        └── push button (Contar) [click]\n\
                        \n\
                        Total: 4 elements\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_depth_limit() {
        let (d, app) = counter();
        let root = ElementHandle::capture(&d, &app).unwrap();
        let text = render_tree(&root, &RenderOptions::default().with_depth(Some(1)));
        assert!(text.contains("frame (Contador)"));
        assert!(!text.contains("Contar"));
        assert!(text.ends_with("Total: 2 elements\n"));

        let only_root = render_tree(
            &root,
            &RenderOptions::default().with_depth(Some(0)).with_total(false),
        );
        assert_eq!(only_root, "application (contador)\n");
    }

    #[test]
    fn test_render_states_and_text() {
        let d = InMemoryDesktop::new();
        let app = d.add_application("form");
        d.add_node(
            &app,
            NodeSpec::new(Role::Entry)
                .name("email")
                .text("a@b.c")
                .state(State::Focused),
        )
        .unwrap();
        let root = ElementHandle::capture(&d, &app).unwrap();
        let text = render_tree(
            &root,
            &RenderOptions::default().with_states(true).with_actions(false),
        );
        assert!(text.contains("entry (email) \"a@b.c\""));
        assert!(text.contains("focused"));
    }
}
