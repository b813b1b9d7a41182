//! Register and e-fuse address map for the MT76xx radio.
//!
//! The addresses and field masks mirror the vendor definitions used by the
//! OpenWrt mt76 driver for the same silicon.

pub const fn bit(nr: u32) -> u32 {
    1 << nr
}

/// Mask covering bits `high..=low`, inclusive.
pub const fn genmask(high: u32, low: u32) -> u32 {
    ((!0u32) - (1 << low) + 1) & ((!0u32) >> (31 - high))
}

pub const MT_ASIC_VERSION: u32 = 0x0000;

pub const MT_CMB_CTRL: u32 = 0x0020;

pub const MT_EFUSE_CTRL: u32 = 0x0024;
pub const MT_EFUSE_CTRL_KICK: u32 = bit(30);

pub const MT_EFUSE_DATA_BASE: u32 = 0x0028;

pub const MT_LDO_CTRL_1: u32 = 0x0070;

pub const MT_XO_CTRL5: u32 = 0x0114;
pub const MT_XO_CTRL5_C2_VAL: u32 = genmask(14, 8);

pub const MT_XO_CTRL6: u32 = 0x0118;
pub const MT_XO_CTRL6_C2_CTRL: u32 = genmask(14, 8);

/// Power-on RF patch register.
pub const MT_RF_PATCH: u32 = 0x0130;

pub const MT_WPDMA_GLO_CFG: u32 = 0x0208;

pub const MT_WMM_AIFSN: u32 = 0x0214;
pub const MT_WMM_CWMIN: u32 = 0x0218;
pub const MT_WMM_CWMAX: u32 = 0x021c;

pub const MT_FCE_DMA_ADDR: u32 = 0x0230;
pub const MT_FCE_DMA_LEN: u32 = 0x0234;
pub const MT_USB_DMA_CFG: u32 = 0x0238;

pub const MT_TSO_CTRL: u32 = 0x0250;

pub const MT_PBF_SYS_CTRL: u32 = 0x0400;
pub const MT_PBF_CFG: u32 = 0x0404;
pub const MT_PBF_TX_MAX_PCNT: u32 = 0x0408;

pub const MT_RF_BYPASS_0: u32 = 0x0504;
pub const MT_RF_SETTING_0: u32 = 0x050c;

pub const MT_FCE_PSE_CTRL: u32 = 0x0800;

pub const MT_FCE_L2_STUFF: u32 = 0x080c;

pub const MT_TX_CPU_FROM_FCE_BASE_PTR: u32 = 0x09a0;
pub const MT_TX_CPU_FROM_FCE_MAX_COUNT: u32 = 0x09a4;
pub const MT_TX_CPU_FROM_FCE_CPU_DESC_IDX: u32 = 0x09a8;
pub const MT_FCE_PDMA_GLOBAL_CONF: u32 = 0x09c4;

pub const MT_PAUSE_ENABLE_CONTROL1: u32 = 0x0a38;

pub const MT_FCE_SKIP_FS: u32 = 0x0a6c;

pub const MT_MAC_CSR0: u32 = 0x1000;

pub const MT_MAC_SYS_CTRL: u32 = 0x1004;
pub const MT_MAC_SYS_CTRL_RESET_CSR: u32 = bit(0);
pub const MT_MAC_SYS_CTRL_RESET_BBP: u32 = bit(1);
pub const MT_MAC_SYS_CTRL_ENABLE_TX: u32 = bit(2);
pub const MT_MAC_SYS_CTRL_ENABLE_RX: u32 = bit(3);

pub const MT_MAC_ADDR_DW0: u32 = 0x1008;
pub const MT_MAC_BSSID_DW0: u32 = 0x1010;

pub const MT_MAX_LEN_CFG: u32 = 0x1018;

pub const MT_AMPDU_MAX_LEN_20M1S: u32 = 0x1030;
pub const MT_AMPDU_MAX_LEN_20M2S: u32 = 0x1034;

pub const MT_XIFS_TIME_CFG: u32 = 0x1100;
pub const MT_BKOFF_SLOT_CFG: u32 = 0x1104;
pub const MT_CH_TIME_CFG: u32 = 0x110c;

pub const MT_BEACON_TIME_CFG: u32 = 0x1114;

pub const MT_PWR_PIN_CFG: u32 = 0x1204;

pub const MT_RF_PA_MODE_ADJ0: u32 = 0x1228;
pub const MT_RF_PA_MODE_ADJ1: u32 = 0x122c;

pub const MT_DACCLK_EN_DLY_CFG: u32 = 0x1264;

pub const MT_EDCA_CFG_BASE: u32 = 0x1300;

pub const fn mt_edca_cfg_ac(n: u32) -> u32 {
    MT_EDCA_CFG_BASE + (n << 2)
}

pub const MT_TX_PIN_CFG: u32 = 0x1328;

pub const MT_TX_SW_CFG0: u32 = 0x1330;
pub const MT_TX_SW_CFG1: u32 = 0x1334;

pub const MT_TXOP_CTRL_CFG: u32 = 0x1340;
pub const MT_TX_RTS_CFG: u32 = 0x1344;
pub const MT_TX_TIMEOUT_CFG: u32 = 0x1348;
pub const MT_TX_RETRY_CFG: u32 = 0x134c;

pub const MT_CCK_PROT_CFG: u32 = 0x1364;
pub const MT_OFDM_PROT_CFG: u32 = 0x1368;
pub const MT_MM20_PROT_CFG: u32 = 0x136c;
pub const MT_GF20_PROT_CFG: u32 = 0x1374;
pub const MT_GF40_PROT_CFG: u32 = 0x1378;

pub const MT_EXP_ACK_TIME: u32 = 0x1380;

pub const MT_TX0_RF_GAIN_CORR: u32 = 0x13a0;
pub const MT_TX1_RF_GAIN_CORR: u32 = 0x13a4;

pub const MT_TX_ALC_CFG_0: u32 = 0x13b0;
pub const MT_TX_ALC_CFG_2: u32 = 0x13a8;
pub const MT_TX_ALC_CFG_3: u32 = 0x13ac;
pub const MT_TX_ALC_CFG_4: u32 = 0x13c0;

pub const MT_TX_PROT_CFG6: u32 = 0x13e0;
pub const MT_TX_PROT_CFG7: u32 = 0x13e4;
pub const MT_TX_PROT_CFG8: u32 = 0x13e8;

pub const MT_PIFS_TX_CFG: u32 = 0x13ec;

pub const MT_RX_FILTR_CFG: u32 = 0x1400;

pub const MT_AUTO_RSP_CFG: u32 = 0x1404;
pub const MT_LEGACY_BASIC_RATE: u32 = 0x1408;
pub const MT_HT_BASIC_RATE: u32 = 0x140c;

pub const MT_EXT_CCA_CFG: u32 = 0x141c;

pub const MT_PN_PAD_MODE: u32 = 0x150c;

pub const MT_TXOP_HLDR_ET: u32 = 0x1608;

pub const MT_WCID_ADDR_BASE: u32 = 0x1800;

pub const fn mt_wcid_addr(wcid: u32) -> u32 {
    MT_WCID_ADDR_BASE + wcid * 8
}

pub const MT_BBP_AGC_BASE: u32 = 0x2300;

pub const fn mt_bbp_agc(n: u32) -> u32 {
    MT_BBP_AGC_BASE + (n << 2)
}

pub const MT_USB_U3DMA_CFG: u32 = 0x9018;

pub const MT_BEACON_BASE: u32 = 0xc000;

/* E-fuse layout */

pub const MT_EE_CHIP_ID: u8 = 0x000;
pub const MT_EE_MAC_ADDR: u8 = 0x004;
pub const MT_EE_XTAL_TRIM_1: u8 = 0x3a;
pub const MT_EE_XTAL_TRIM_2: u8 = 0x9e;
pub const MT_EE_TX_POWER_0_START_2G: u8 = 0x56;
pub const MT_EE_TX_POWER_0_START_5G: u8 = 0x62;

pub const MT_EE_TX_POWER_GROUP_SIZE_5G: u8 = 5;

/* Values specific to the dongle's firmware */

/// Mode values kicked through `MT_VEND_DEV_MODE`.
pub const MT_FW_RESET_IVB: u16 = 0x01;
pub const MT_FW_LOAD_IVB: u16 = 0x12;

pub const MT_MCU_ILM_OFFSET: u32 = 0x80000;
// DLM offset differs from the OpenWrt source
pub const MT_MCU_DLM_OFFSET: u32 = 0x100000 + 0x10800;
pub const MT_FW_CHUNK_SIZE: usize = 0x3800;
pub const MT_DMA_COMPLETE: u32 = 0xc0000000;

/// Offset of the register window in MCU memory, used for burst writes.
pub const MT_REGISTER_OFFSET: u32 = 0x410000;

/// Channel power limits (0 dB to 23.5 dB in 0.5 dB steps).
pub const MT_CH_POWER_MIN: u8 = 0x00;
pub const MT_CH_POWER_MAX: u8 = 0x2f;

#[cfg(test)]
mod registers_test {
    use super::*;

    #[test]
    fn test_genmask() {
        assert_eq!(genmask(14, 8), 0x7f00);
        assert_eq!(genmask(31, 0), 0xffffffff);
        assert_eq!(genmask(0, 0), 0x1);
    }

    #[test]
    fn test_derived_addresses() {
        assert_eq!(mt_wcid_addr(1), 0x1808);
        assert_eq!(mt_edca_cfg_ac(3), 0x130c);
        assert_eq!(mt_bbp_agc(8), 0x2320);
        assert_eq!(mt_bbp_agc(9), 0x2324);
    }
}
