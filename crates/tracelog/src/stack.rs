//! Call stacks attached to trace events.

use std::ffi::c_void;

/// Maximum number of frames captured by [`Stack::capture`].
pub const MAX_FRAMES: usize = 100;

/// A captured call stack in program-counter form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    /// Program counters, innermost frame first.
    pub frames: Vec<usize>,

    /// Offset subtracted from every program counter when encoding,
    /// so that the encoded addresses are relative to the loaded binary.
    pub off: usize,
}

/// A symbolized stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub func: String,
}

impl Stack {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Captures the current call stack, skipping the `skip` innermost frames
    /// (in addition to this function's own frame).
    ///
    /// The offset is the load address of the object containing the first
    /// captured frame.
    #[inline(never)]
    pub fn capture(skip: usize) -> Self {
        let mut frames = Vec::with_capacity(32);
        let mut module_base = None;
        let mut to_skip = skip + 1;

        backtrace::trace(|frame| {
            if to_skip > 0 {
                to_skip -= 1;
                return true;
            }
            if frames.is_empty() {
                module_base = frame.module_base_address().map(|b| b as usize);
            }
            frames.push(frame.ip() as usize);
            frames.len() < MAX_FRAMES
        });

        // The unwinder only knows the module base on some platforms.
        let off = module_base
            .or_else(|| frames.first().and_then(|&pc| load_base(pc)))
            .unwrap_or(0);

        Stack { frames, off }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Resolves the program counters into file, line and function names.
    /// Frames that cannot be resolved are returned with empty fields.
    pub fn format(&self) -> Vec<Frame> {
        self.frames
            .iter()
            .map(|&pc| {
                let mut frame = Frame::default();
                backtrace::resolve(pc as *mut c_void, |sym| {
                    // Only keep the first (outermost inlined) symbol.
                    if !frame.func.is_empty() {
                        return;
                    }
                    if let Some(name) = sym.name() {
                        frame.func = name.to_string();
                    }
                    if let Some(file) = sym.filename() {
                        frame.file = file.display().to_string();
                    }
                    frame.line = sym.lineno().unwrap_or(0);
                });
                frame
            })
            .collect()
    }
}

/// Returns the address the object containing `addr` was loaded at.
#[cfg(unix)]
fn load_base(addr: usize) -> Option<usize> {
    let mut info = libc::Dl_info {
        dli_fname: std::ptr::null(),
        dli_fbase: std::ptr::null_mut(),
        dli_sname: std::ptr::null(),
        dli_saddr: std::ptr::null_mut(),
    };
    // SAFETY: dladdr only reads the dynamic loader's tables and writes to `info`.
    let res = unsafe { libc::dladdr(addr as *const c_void, &mut info as *mut libc::Dl_info) };
    if res == 0 || info.dli_fbase.is_null() {
        None
    } else {
        Some(info.dli_fbase as usize)
    }
}

#[cfg(not(unix))]
fn load_base(_addr: usize) -> Option<usize> {
    None
}
