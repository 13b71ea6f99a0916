//! DCMI (Ascend Device Control Management Interface) backend

use crate::discovery::DeviceIdentity;
use crate::metrics::Signal;
use crate::query::{DeviceQuery, QueryError, QueryResult};
use crate::{AdapterError, Result};

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use tracing::{debug, info, warn};

/// Maximum number of cards requested from the library
pub const MAX_CARD_NUM: usize = 64;

const DCMI_OK: c_int = 0;

const UTILIZATION_MEMORY: c_int = 1;
const UTILIZATION_AICORE: c_int = 2;
const UTILIZATION_AICPU: c_int = 3;

const FREQUENCY_MEMORY: c_int = 1;

const VERSION_BUF_LEN: usize = 256;

#[allow(non_camel_case_types)]
mod ffi {
    use std::os::raw::{c_char, c_int, c_uint};

    pub const MAX_CORE_NUM: usize = 64;

    #[repr(C)]
    #[derive(Default)]
    pub struct dcmi_aicore_info {
        pub freq: c_uint,
        pub cur_freq: c_uint,
    }

    #[repr(C)]
    pub struct dcmi_aicpu_info {
        pub max_freq: c_uint,
        pub cur_freq: c_uint,
        pub aicpu_num: c_uint,
        pub util_rate: [c_uint; MAX_CORE_NUM],
    }

    impl Default for dcmi_aicpu_info {
        fn default() -> Self {
            Self {
                max_freq: 0,
                cur_freq: 0,
                aicpu_num: 0,
                util_rate: [0; MAX_CORE_NUM],
            }
        }
    }

    #[link(name = "dcmi")]
    extern "C" {
        pub fn dcmi_init() -> c_int;
        pub fn dcmi_get_dcmi_version(dcmi_ver: *mut c_char, len: c_uint) -> c_int;
        pub fn dcmi_get_driver_version(driver_ver: *mut c_char, len: c_uint) -> c_int;
        pub fn dcmi_get_card_list(card_num: *mut c_int, card_list: *mut c_int, list_len: c_int) -> c_int;
        pub fn dcmi_get_device_id_in_card(
            card_id: c_int,
            device_id_max: *mut c_int,
            mcu_id: *mut c_int,
            cpu_id: *mut c_int,
        ) -> c_int;
        pub fn dcmi_get_device_utilization_rate(
            card_id: c_int,
            device_id: c_int,
            input_type: c_int,
            utilization_rate: *mut c_uint,
        ) -> c_int;
        pub fn dcmi_get_device_aicore_info(
            card_id: c_int,
            device_id: c_int,
            aicore_info: *mut dcmi_aicore_info,
        ) -> c_int;
        pub fn dcmi_get_device_aicpu_info(
            card_id: c_int,
            device_id: c_int,
            aicpu_info: *mut dcmi_aicpu_info,
        ) -> c_int;
        pub fn dcmi_get_device_frequency(
            card_id: c_int,
            device_id: c_int,
            input_type: c_int,
            frequency: *mut c_uint,
        ) -> c_int;
        pub fn dcmi_get_device_power_info(card_id: c_int, device_id: c_int, power: *mut c_int) -> c_int;
        pub fn dcmi_get_device_health(card_id: c_int, device_id: c_int, health: *mut c_uint) -> c_int;
        pub fn dcmi_get_device_temperature(card_id: c_int, device_id: c_int, temperature: *mut c_int) -> c_int;
        pub fn dcmi_get_device_voltage(card_id: c_int, device_id: c_int, voltage: *mut c_uint) -> c_int;
    }
}

/// Device query backed by `libdcmi`
pub struct DcmiDeviceQuery {
    library_version: Option<String>,
    driver_version: Option<String>,
}

impl DcmiDeviceQuery {
    /// Initialize the library. Failure is fatal for the process.
    pub fn new() -> Result<Self> {
        info!("Initializing DCMI library");

        // SAFETY: dcmi_init takes no arguments and may be called before any other DCMI call.
        let ret = unsafe { ffi::dcmi_init() };
        if ret != DCMI_OK {
            return Err(AdapterError::InitializationFailed(format!(
                "dcmi_init failed (ret={})",
                ret
            )));
        }

        let library_version = read_version(ffi::dcmi_get_dcmi_version, "dcmi_get_dcmi_version");
        let driver_version = read_version(ffi::dcmi_get_driver_version, "dcmi_get_driver_version");

        Ok(Self {
            library_version,
            driver_version,
        })
    }

    fn utilization(&self, device: DeviceIdentity, input_type: c_int) -> QueryResult<i64> {
        let mut rate: c_uint = 0;
        // SAFETY: `rate` is a valid out pointer for the duration of the call.
        let ret = unsafe {
            ffi::dcmi_get_device_utilization_rate(device.card_id, device.device_id, input_type, &mut rate)
        };
        check(ret).map(|_| i64::from(rate))
    }

    fn aicore_frequency(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut info = ffi::dcmi_aicore_info::default();
        // SAFETY: `info` matches the library's struct layout and outlives the call.
        let ret = unsafe { ffi::dcmi_get_device_aicore_info(device.card_id, device.device_id, &mut info) };
        check(ret).map(|_| i64::from(info.cur_freq))
    }

    fn aicpu_frequency(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut info = ffi::dcmi_aicpu_info::default();
        // SAFETY: `info` matches the library's struct layout and outlives the call.
        let ret = unsafe { ffi::dcmi_get_device_aicpu_info(device.card_id, device.device_id, &mut info) };
        check(ret).map(|_| i64::from(info.cur_freq))
    }

    fn memory_frequency(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut freq: c_uint = 0;
        // SAFETY: `freq` is a valid out pointer for the duration of the call.
        let ret = unsafe {
            ffi::dcmi_get_device_frequency(device.card_id, device.device_id, FREQUENCY_MEMORY, &mut freq)
        };
        check(ret).map(|_| i64::from(freq))
    }

    fn power(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut power: c_int = 0;
        // SAFETY: `power` is a valid out pointer for the duration of the call.
        let ret = unsafe { ffi::dcmi_get_device_power_info(device.card_id, device.device_id, &mut power) };
        check(ret).map(|_| i64::from(power))
    }

    fn health(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut health: c_uint = 0;
        // SAFETY: `health` is a valid out pointer for the duration of the call.
        let ret = unsafe { ffi::dcmi_get_device_health(device.card_id, device.device_id, &mut health) };
        check(ret).map(|_| i64::from(health))
    }

    fn temperature(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut temperature: c_int = 0;
        // SAFETY: `temperature` is a valid out pointer for the duration of the call.
        let ret =
            unsafe { ffi::dcmi_get_device_temperature(device.card_id, device.device_id, &mut temperature) };
        check(ret).map(|_| i64::from(temperature))
    }

    fn voltage(&self, device: DeviceIdentity) -> QueryResult<i64> {
        let mut voltage: c_uint = 0;
        // SAFETY: `voltage` is a valid out pointer for the duration of the call.
        let ret = unsafe { ffi::dcmi_get_device_voltage(device.card_id, device.device_id, &mut voltage) };
        check(ret).map(|_| i64::from(voltage))
    }
}

impl DeviceQuery for DcmiDeviceQuery {
    fn name(&self) -> &str {
        "ascend_npu"
    }

    fn card_list(&self) -> QueryResult<Vec<i32>> {
        let mut count: c_int = 0;
        let mut cards = [0 as c_int; MAX_CARD_NUM];

        // SAFETY: `cards` holds MAX_CARD_NUM entries and the library writes at most that many.
        let ret = unsafe { ffi::dcmi_get_card_list(&mut count, cards.as_mut_ptr(), MAX_CARD_NUM as c_int) };
        check(ret)?;

        let count = usize::try_from(count).unwrap_or(0);
        if count > MAX_CARD_NUM {
            warn!("Library reported {} cards, truncating to {}", count, MAX_CARD_NUM);
        }
        let listed = cards[..count.min(MAX_CARD_NUM)].to_vec();
        debug!("dcmi_get_card_list returned {:?}", listed);
        Ok(listed)
    }

    fn device_count(&self, card_id: i32) -> QueryResult<i32> {
        let mut device_count: c_int = 0;
        let mut mcu_id: c_int = 0;
        let mut cpu_id: c_int = 0;

        // SAFETY: all three out pointers are valid for the duration of the call.
        let ret = unsafe {
            ffi::dcmi_get_device_id_in_card(card_id, &mut device_count, &mut mcu_id, &mut cpu_id)
        };
        check(ret).map(|_| device_count)
    }

    fn read_signal(&self, device: DeviceIdentity, signal: Signal) -> QueryResult<i64> {
        match signal {
            Signal::AicoreUtilization => self.utilization(device, UTILIZATION_AICORE),
            Signal::AicpuUtilization => self.utilization(device, UTILIZATION_AICPU),
            Signal::MemoryUtilization => self.utilization(device, UTILIZATION_MEMORY),
            Signal::AicoreFrequency => self.aicore_frequency(device),
            Signal::AicpuFrequency => self.aicpu_frequency(device),
            Signal::MemoryFrequency => self.memory_frequency(device),
            Signal::Power => self.power(device),
            Signal::Health => self.health(device),
            Signal::Temperature => self.temperature(device),
            Signal::Voltage => self.voltage(device),
        }
    }

    fn library_version(&self) -> Option<String> {
        self.library_version.clone()
    }

    fn driver_version(&self) -> Option<String> {
        self.driver_version.clone()
    }
}

fn check(ret: c_int) -> QueryResult<()> {
    if ret == DCMI_OK {
        Ok(())
    } else {
        Err(QueryError::new(ret))
    }
}

type VersionFn = unsafe extern "C" fn(*mut c_char, c_uint) -> c_int;

fn read_version(call: VersionFn, what: &str) -> Option<String> {
    let mut buf = [0 as c_char; VERSION_BUF_LEN];

    // SAFETY: the buffer length passed matches the buffer and it is zeroed, so it stays
    // NUL-terminated as long as the library respects `len`.
    let ret = unsafe { call(buf.as_mut_ptr(), VERSION_BUF_LEN as c_uint) };
    if ret != DCMI_OK {
        warn!("{} failed (ret={})", what, ret);
        return None;
    }

    buf[VERSION_BUF_LEN - 1] = 0;
    // SAFETY: the buffer was terminated above.
    let version = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(version.to_string_lossy().into_owned())
}
