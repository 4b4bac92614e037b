#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "text_model",
        action: "set_text_model",
    },
    CommandSpec {
        command: "image_model",
        action: "set_image_model",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "portrait_out",
    action: "export_portrait",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "summon",
        action: "summon",
    },
    CommandSpec {
        command: "forge",
        action: "summon",
    },
    CommandSpec {
        command: "portrait",
        action: "portrait",
    },
    CommandSpec {
        command: "backstory",
        action: "backstory",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
    CommandSpec {
        command: "show",
        action: "show",
    },
    CommandSpec {
        command: "deck",
        action: "deck",
    },
    CommandSpec {
        command: "dismiss",
        action: "dismiss",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/summon",
    "/portrait",
    "/backstory",
    "/save",
    "/show",
    "/deck",
    "/dismiss",
    "/status",
    "/text_model",
    "/image_model",
    "/portrait_out",
    "/help",
    "/quit",
];
