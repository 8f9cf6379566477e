/// Average hexagon area in km² per resolution.
const AVERAGE_AREA_KM2: [f64; 16] = [
    4_357_449.416_078_383,
    609_788.441_794_133_2,
    86_801.780_398_489_28,
    12_393.434_655_088,
    1_770.347_654_491,
    252.903_858_182,
    36.129_062_164,
    5.161_293_360,
    0.737_327_598,
    0.105_332_513,
    0.015_047_502,
    0.002_149_643,
    0.000_307_092,
    0.000_043_870,
    0.000_006_267,
    0.000_000_895,
];

pub fn average_area_km2(res: u8) -> Option<f64> {
    AVERAGE_AREA_KM2.get(usize::from(res)).copied()
}

/// Share of a parent's area covered by one child at `child_res` (roughly 1/7).
pub fn child_area_ratio(child_res: u8) -> Option<f64> {
    if child_res == 0 {
        return None;
    }
    Some(average_area_km2(child_res)? / average_area_km2(child_res - 1)?)
}
