//! icebang-linux-gpio - Linux GPIO backend
//!
//! This crate wires the icebang protocol engines to real pins using the
//! Linux character device GPIO interface (gpiocdev). The FPGA system clock
//! comes from a hardware PWM channel exposed through sysfs, since a
//! bit-banged clock from user space would stall whenever the process does.
//!
//! # Usage with icebang CLI
//!
//! ```bash
//! # Load a bitstream into FPGA configuration memory
//! icebang fpga -p linux_gpio:gpiochip=0,cdone=26,creset=27,cs=9,mosi=8,sck=11,clock=0:1 cram top.bin
//!
//! # Write the same bitstream to the configuration flash
//! icebang flash -p linux_gpio:dev=/dev/gpiochip0,sck=11,mosi=10,miso=9,cs=25 write top.bin
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` and `/sys/class/pwm` (may require root or udev rules)

pub mod device;
pub mod error;
pub mod line;
pub mod pwm;

// Re-exports
pub use device::{
    open_flash, open_fpga, parse_flash_options, parse_fpga_options, LinuxGpioFlashConfig,
    LinuxGpioFpgaConfig, LinuxIceFpga, LinuxSpiFlash,
};
pub use error::{LinuxGpioError, Result};
pub use line::{GpioLine, SleepDelay};
pub use pwm::PwmClock;
