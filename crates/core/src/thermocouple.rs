//! Type-K thermocouple voltage/temperature conversion by table interpolation.
//!
//! The reference table holds one entry per whole degree Celsius starting at 0 °C.
//! Voltages are relative to a 0 °C reference junction; callers add ambient
//! temperature themselves.

use crate::error::ConversionError;

/// Thermocouple EMF in volts, indexed by temperature in °C.
const LOOKUP_TABLE: [f32; 400] = [
    0.000000, 0.000039, 0.000078, 0.000117, 0.000156, 0.000195, 0.000234, 0.000273, 0.000312, 0.000352, 0.000391, 0.000431, 0.000470, 0.000510, 0.000549, 0.000589,
    0.000629, 0.000669, 0.000709, 0.000749, 0.000790, 0.000830, 0.000870, 0.000911, 0.000951, 0.000992, 0.001033, 0.001074, 0.001114, 0.001155, 0.001196, 0.001238,
    0.001279, 0.001320, 0.001362, 0.001403, 0.001445, 0.001486, 0.001528, 0.001570, 0.001612, 0.001654, 0.001696, 0.001738, 0.001780, 0.001823, 0.001865, 0.001908,
    0.001950, 0.001993, 0.002036, 0.002079, 0.002122, 0.002165, 0.002208, 0.002251, 0.002294, 0.002338, 0.002381, 0.002425, 0.002468, 0.002512, 0.002556, 0.002600,
    0.002643, 0.002687, 0.002732, 0.002776, 0.002820, 0.002864, 0.002909, 0.002953, 0.002998, 0.003043, 0.003087, 0.003132, 0.003177, 0.003222, 0.003267, 0.003312,
    0.003358, 0.003403, 0.003448, 0.003494, 0.003539, 0.003585, 0.003631, 0.003677, 0.003722, 0.003768, 0.003814, 0.003860, 0.003907, 0.003953, 0.003999, 0.004046,
    0.004092, 0.004138, 0.004185, 0.004232, 0.004279, 0.004325, 0.004372, 0.004419, 0.004466, 0.004513, 0.004561, 0.004608, 0.004655, 0.004702, 0.004750, 0.004798,
    0.004845, 0.004893, 0.004941, 0.004988, 0.005036, 0.005084, 0.005132, 0.005180, 0.005228, 0.005277, 0.005325, 0.005373, 0.005422, 0.005470, 0.005519, 0.005567,
    0.005616, 0.005665, 0.005714, 0.005763, 0.005812, 0.005861, 0.005910, 0.005959, 0.006008, 0.006057, 0.006107, 0.006156, 0.006206, 0.006255, 0.006305, 0.006355,
    0.006404, 0.006454, 0.006504, 0.006554, 0.006604, 0.006654, 0.006704, 0.006754, 0.006805, 0.006855, 0.006905, 0.006956, 0.007006, 0.007057, 0.007107, 0.007158,
    0.007209, 0.007260, 0.007310, 0.007361, 0.007412, 0.007463, 0.007515, 0.007566, 0.007617, 0.007668, 0.007720, 0.007771, 0.007823, 0.007874, 0.007926, 0.007977,
    0.008029, 0.008081, 0.008133, 0.008185, 0.008237, 0.008289, 0.008341, 0.008393, 0.008445, 0.008497, 0.008550, 0.008602, 0.008654, 0.008707, 0.008759, 0.008812,
    0.008865, 0.008917, 0.008970, 0.009023, 0.009076, 0.009129, 0.009182, 0.009235, 0.009288, 0.009341, 0.009395, 0.009448, 0.009501, 0.009555, 0.009608, 0.009662,
    0.009715, 0.009769, 0.009822, 0.009876, 0.009930, 0.009984, 0.010038, 0.010092, 0.010146, 0.010200, 0.010254, 0.010308, 0.010362, 0.010417, 0.010471, 0.010525,
    0.010580, 0.010634, 0.010689, 0.010743, 0.010798, 0.010853, 0.010907, 0.010962, 0.011017, 0.011072, 0.011127, 0.011182, 0.011237, 0.011292, 0.011347, 0.011403,
    0.011458, 0.011513, 0.011569, 0.011624, 0.011680, 0.011735, 0.011791, 0.011846, 0.011902, 0.011958, 0.012013, 0.012069, 0.012125, 0.012181, 0.012237, 0.012293,
    0.012349, 0.012405, 0.012461, 0.012518, 0.012574, 0.012630, 0.012687, 0.012743, 0.012799, 0.012856, 0.012912, 0.012969, 0.013026, 0.013082, 0.013139, 0.013196,
    0.013253, 0.013310, 0.013366, 0.013423, 0.013480, 0.013537, 0.013595, 0.013652, 0.013709, 0.013766, 0.013823, 0.013881, 0.013938, 0.013995, 0.014053, 0.014110,
    0.014168, 0.014226, 0.014283, 0.014341, 0.014399, 0.014456, 0.014514, 0.014572, 0.014630, 0.014688, 0.014746, 0.014804, 0.014862, 0.014920, 0.014978, 0.015036,
    0.015095, 0.015153, 0.015211, 0.015270, 0.015328, 0.015386, 0.015445, 0.015503, 0.015562, 0.015621, 0.015679, 0.015738, 0.015797, 0.015856, 0.015914, 0.015973,
    0.016032, 0.016091, 0.016150, 0.016209, 0.016268, 0.016327, 0.016387, 0.016446, 0.016505, 0.016564, 0.016624, 0.016683, 0.016742, 0.016802, 0.016861, 0.016921,
    0.016980, 0.017040, 0.017100, 0.017159, 0.017219, 0.017279, 0.017339, 0.017399, 0.017458, 0.017518, 0.017578, 0.017638, 0.017698, 0.017759, 0.017819, 0.017879,
    0.017939, 0.017999, 0.018060, 0.018120, 0.018180, 0.018241, 0.018301, 0.018362, 0.018422, 0.018483, 0.018543, 0.018604, 0.018665, 0.018725, 0.018786, 0.018847,
    0.018908, 0.018969, 0.019030, 0.019091, 0.019152, 0.019213, 0.019274, 0.019335, 0.019396, 0.019457, 0.019518, 0.019579, 0.019641, 0.019702, 0.019763, 0.019825,
    0.019886, 0.019947, 0.020009, 0.020070, 0.020132, 0.020193, 0.020255, 0.020317, 0.020378, 0.020440, 0.020502, 0.020563, 0.020625, 0.020687, 0.020748, 0.020810,
];

/// Lowest voltage covered by the table.
pub const VOLTAGE_MIN: f32 = LOOKUP_TABLE[0];
/// Highest voltage covered by the table.
pub const VOLTAGE_MAX: f32 = LOOKUP_TABLE[LOOKUP_TABLE.len() - 1];
/// Lowest temperature covered by the table.
pub const TEMPERATURE_MIN: f32 = 0.0;
/// Highest temperature covered by the table.
pub const TEMPERATURE_MAX: f32 = (LOOKUP_TABLE.len() - 1) as f32;

/// Converts a thermocouple voltage to degrees Celsius above the reference junction.
pub fn volts_to_celsius(volts: f32) -> Result<f32, ConversionError> {
    if !volts.is_finite() {
        return Err(ConversionError::NotFinite);
    }
    if volts < VOLTAGE_MIN {
        return Err(ConversionError::VoltageBelowMin(volts));
    }
    if volts > VOLTAGE_MAX {
        return Err(ConversionError::VoltageAboveMax(volts));
    }

    // first entry at or above the input
    let upper = LOOKUP_TABLE
        .iter()
        .position(|&v| v >= volts)
        .ok_or(ConversionError::VoltageAboveMax(volts))?;
    if upper == 0 {
        return Ok(TEMPERATURE_MIN);
    }

    let lower = upper - 1;
    let fraction = (volts - LOOKUP_TABLE[lower]) / (LOOKUP_TABLE[upper] - LOOKUP_TABLE[lower]);
    Ok(lower as f32 + fraction)
}

/// Converts degrees Celsius above the reference junction to thermocouple voltage.
pub fn celsius_to_volts(celsius: f32) -> Result<f32, ConversionError> {
    if !celsius.is_finite() {
        return Err(ConversionError::NotFinite);
    }
    if celsius < TEMPERATURE_MIN {
        return Err(ConversionError::TemperatureBelowMin(celsius));
    }
    if celsius > TEMPERATURE_MAX {
        return Err(ConversionError::TemperatureAboveMax(celsius));
    }

    let lower = celsius.floor() as usize;
    let upper = celsius.ceil() as usize;
    let fraction = celsius - celsius.floor();
    Ok(LOOKUP_TABLE[lower] + (LOOKUP_TABLE[upper] - LOOKUP_TABLE[lower]) * fraction)
}
