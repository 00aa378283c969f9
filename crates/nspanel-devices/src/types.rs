//! Closed string-valued enumerations of the panel protocol.

use serde::{Deserialize, Serialize};

/// Declares a string-valued enum with serde renames, `as_str`, `Display`,
/// `FromStr` and an `ALL` list.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $value:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $value $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value $(| $alias)* => Ok($name::$variant),)+
                    _ => Err($crate::error::ProtocolError::invalid_argument(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Device display category.
    pub enum Category {
        Plug => "plug",
        Switch => "switch",
        Light => "light",
        Curtain => "curtain",
        ContactSensor => "contactSensor",
        MotionSensor => "motionSensor",
        TemperatureSensor => "temperatureSensor",
        HumiditySensor => "humiditySensor",
        TemperatureAndHumiditySensor => "temperatureAndHumiditySensor",
        WaterLeakDetector => "waterLeakDetector",
        SmokeDetector => "smokeDetector",
        Button => "button",
        Camera => "camera",
        Sensor => "sensor",
        Thermostat => "thermostat",
    }
}

string_enum! {
    /// Named bundle of capability definitions referenced by categories.
    pub enum Group {
        Power => "power",
        Toggle => "toggle",
        Brightness => "brightness",
        ColorTemperature => "color_temperature",
        ColorRgb => "color_rgb",
        Startup => "startup",
        CurtainControl => "curtain_control",
        CurtainSettings => "curtain_settings",
        CameraStream => "camera_stream",
        Detect => "detect",
        Temperature => "temperature",
        Humidity => "humidity",
        Battery => "battery",
        Press => "press",
        Rssi => "rssi",
        Thermostat => "thermostat",
        Illumination => "illumination",
    }
}

string_enum! {
    /// Capability type as used on the wire.
    pub enum CapabilityType {
        Power => "power",
        Toggle => "toggle",
        Brightness => "brightness",
        ColorTemperature => "color-temperature",
        ColorRgb => "color-rgb",
        Percentage => "percentage",
        MotorControl => "motor-control",
        MotorReverse => "motor-reverse",
        MotorCalibration => "motor-clb",
        Startup => "startup",
        CameraStream => "camera-stream",
        Detect => "detect",
        Humidity => "humidity",
        Temperature => "temperature",
        Battery => "battery",
        Press => "press",
        Rssi => "rssi",
        ThermostatMode => "thermostat-mode",
        ThermostatTargetSetpoint => "thermostat-target-setpoint",
        IlluminationLevel => "illumination-level",
    }
}

string_enum! {
    /// Attribute key inside a capability state.
    pub enum AttributeType {
        PowerState => "powerState",
        ToggleState => "toggleState",
        Brightness => "brightness",
        ColorTemperature => "colorTemperature",
        Red => "red",
        Green => "green",
        Blue => "blue",
        Percent => "percent",
        MotorControl => "motorControl",
        MotorReverse => "motorReverse",
        MotorCalibration => "motorClb",
        Startup => "startup",
        Detected => "detected",
        Humidity => "humidity",
        Temperature => "temperature",
        Battery => "battery",
        Press => "press",
        Rssi => "rssi",
        ThermostatMode => "thermostatMode",
        TargetSetpoint => "targetSetpoint",
        IlluminationLevel => "illuminationLevel",
    }
}

string_enum! {
    /// Configuration row key. Segments separated by
    /// [`CONFIGURATION_PATH_DELIMITER`] become nested objects on the wire.
    pub enum ConfigurationType {
        RangeMin => "range_min",
        RangeMax => "range_max",
        TemperatureMin => "temperature_min",
        TemperatureMax => "temperature_max",
        TemperatureIncrement => "temperature_increment",
        TemperatureScale => "temperature_scale",
        SupportedModes => "supportedModes",
        StreamUrl => "streamUrl",
    }
}

/// Separator between nested path segments of a configuration key.
pub const CONFIGURATION_PATH_DELIMITER: char = '_';

impl ConfigurationType {
    /// Path segments of the nested wire definition.
    pub fn path(&self) -> Vec<&'static str> {
        self.as_str().split(CONFIGURATION_PATH_DELIMITER).collect()
    }
}

string_enum! {
    /// Capability permission.
    pub enum Permission {
        Read => "read",
        Write => "write",
        ReadWrite => "readWrite" | "read-write" | "read_write",
    }
}

impl Permission {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

string_enum! {
    /// Declared data type of an attribute or configuration row.
    pub enum DataType {
        Bool => "bool" | "boolean",
        Char => "char",
        UChar => "uchar",
        Short => "short",
        UShort => "ushort",
        Int => "int" | "integer",
        UInt => "uint",
        Float => "float",
        String => "string",
        Enum => "enum",
        Switch => "switch",
        Button => "button",
        Unknown => "unknown",
    }
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Char | Self::UChar | Self::Short | Self::UShort | Self::Int | Self::UInt
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float)
    }

    /// Types whose values are members of a closed string set.
    pub fn is_enumerated(&self) -> bool {
        matches!(self, Self::Enum | Self::Switch | Self::Button)
    }

    /// Inclusive bounds implied by the storage width of integer types.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            Self::Char => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::UChar => Some((0, u8::MAX as i64)),
            Self::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::UShort => Some((0, u16::MAX as i64)),
            Self::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::UInt => Some((0, u32::MAX as i64)),
            _ => None,
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::Unknown
    }
}

string_enum! {
    /// Kind of external device, selects the device factory.
    pub enum DeviceKind {
        /// Device natively paired with the panel
        SubDevice => "sub_device" | "sub-device",
        /// Device bridged to the panel by this connector
        ThirdPartyDevice => "third_party_device" | "third-party-device",
    }
}
