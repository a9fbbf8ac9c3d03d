//! Window event codes delivered to hosted applications.

/// Events the taskbar routes to application windows. The numeric space
/// follows the host protocol: 0x1xxx window control, 0x2xxx menu traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventCode {
    /// Delivered where an event is required but nothing should happen.
    Nop = 0x0000,
    WindowRaise = 0x1001,
    WindowLower = 0x1002,
    WindowMinimize = 0x1003,
    WindowClose = 0x1004,
    MenuSelect = 0x2001,
}

impl EventCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(EventCode::Nop, 0x0000 ; "nop")]
    #[test_case(EventCode::WindowRaise, 0x1001 ; "raise")]
    #[test_case(EventCode::WindowLower, 0x1002 ; "lower")]
    #[test_case(EventCode::WindowMinimize, 0x1003 ; "minimize")]
    #[test_case(EventCode::WindowClose, 0x1004 ; "close")]
    #[test_case(EventCode::MenuSelect, 0x2001 ; "menu select")]
    fn event_codes_match_the_host_protocol(event: EventCode, code: u16) {
        assert_eq!(event.code(), code);
    }
}
