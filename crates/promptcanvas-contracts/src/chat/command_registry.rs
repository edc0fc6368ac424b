#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "category",
        action: "set_category",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
    },
    CommandSpec {
        command: "count",
        action: "set_count",
    },
    CommandSpec {
        command: "history",
        action: "show_history",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "use",
        action: "set_active_image",
    },
    CommandSpec {
        command: "mask",
        action: "set_mask",
    },
    CommandSpec {
        command: "out",
        action: "set_output_dir",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "clear",
        action: "clear_active_image",
    },
    CommandSpec {
        command: "refine",
        action: "toggle_refine",
    },
    CommandSpec {
        command: "categories",
        action: "list_categories",
    },
    CommandSpec {
        command: "styles",
        action: "list_styles",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/category <name>",
    "/style <name>",
    "/count <1-4>",
    "/use <image>",
    "/mask <image>",
    "/clear",
    "/out <dir>",
    "/refine",
    "/history [n]",
    "/categories",
    "/styles",
    "/help",
    "/quit",
];
